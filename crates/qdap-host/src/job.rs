// SPDX-License-Identifier: Apache-2.0
//! Device job lifecycle.
//!
//! A [`Job`] owns a backend-opaque handle and a host-local mirror of the
//! job's lifecycle state. The mirror gates operations the protocol leaves
//! undefined (submit twice, fetch results before completion) so they fail
//! with a descriptive `BadState` on the host side instead of reaching the
//! plugin:
//!
//! ```text
//! CREATED ──submit──▶ SUBMITTED ──▶ {QUEUED, RUNNING} ──▶ DONE
//!    │                                        │             ├─ get_results
//!    └─ set_parameter / query                 └──cancel──▶ CANCELLED / FAILED
//! ```
//!
//! The backend handle and the copied program payload are released exactly
//! once, on drop.

use std::cell::Cell;
use std::ffi::c_void;
use std::time::Duration;

use crate::codec;
use crate::error::{QdapError, Result, check};
use crate::ffi;
use crate::format::ProgramFormat;
use crate::session::Session;

/// Host-side view of a job's lifecycle state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JobStatus {
    Created,
    Submitted,
    Queued,
    Running,
    Done,
    Cancelled,
    Failed,
}

impl JobStatus {
    /// Decode a wire status code.
    pub fn from_raw(raw: ffi::RawJobStatus) -> Result<Self> {
        match raw {
            ffi::QDAP_JOB_STATUS_CREATED => Ok(JobStatus::Created),
            ffi::QDAP_JOB_STATUS_SUBMITTED => Ok(JobStatus::Submitted),
            ffi::QDAP_JOB_STATUS_QUEUED => Ok(JobStatus::Queued),
            ffi::QDAP_JOB_STATUS_RUNNING => Ok(JobStatus::Running),
            ffi::QDAP_JOB_STATUS_DONE => Ok(JobStatus::Done),
            ffi::QDAP_JOB_STATUS_CANCELLED => Ok(JobStatus::Cancelled),
            ffi::QDAP_JOB_STATUS_FAILED => Ok(JobStatus::Failed),
            other => Err(QdapError::DecodeError(format!(
                "unknown job status code {other}"
            ))),
        }
    }

    /// Whether the job can no longer change state.
    pub fn is_terminal(self) -> bool {
        matches!(self, JobStatus::Done | JobStatus::Cancelled | JobStatus::Failed)
    }
}

/// One unit of submitted work against a session.
///
/// Jobs borrow their session and cannot outlive it. Like sessions, a job is
/// not safe for concurrent calls from multiple threads.
pub struct Job<'sess, 'dev> {
    handle: ffi::RawJob,
    session: &'sess Session<'dev>,
    /// Local mirror of the last observed lifecycle state.
    status: Cell<JobStatus>,
}

impl<'sess, 'dev> Job<'sess, 'dev> {
    pub(crate) fn new(handle: ffi::RawJob, session: &'sess Session<'dev>) -> Self {
        Self {
            handle,
            session,
            status: Cell::new(JobStatus::Created),
        }
    }

    /// The last observed status, without a boundary call.
    pub fn status(&self) -> JobStatus {
        self.status.get()
    }

    // -----------------------------------------------------------------------
    // Parameters (CREATED only)
    // -----------------------------------------------------------------------

    /// Set a raw job parameter. Only valid before submission.
    pub fn set_parameter(&self, param: ffi::JobParameterKey, value: &[u8]) -> Result<()> {
        self.require_created("set_parameter")?;
        let ret = unsafe {
            (self.session.device.table.fn_job_set_parameter)(
                self.handle,
                param,
                value.len(),
                value.as_ptr().cast::<c_void>(),
            )
        };
        check(ret, "job_set_parameter")
    }

    /// Set the program to execute. The backend copies and owns the payload;
    /// a previously set program is released by the backend on overwrite.
    pub fn set_program(&self, format: ProgramFormat, source: &str) -> Result<()> {
        self.set_parameter(
            ffi::QDAP_JOB_PARAMETER_PROGRAMFORMAT,
            &format.as_raw().to_ne_bytes(),
        )?;
        self.set_parameter(ffi::QDAP_JOB_PARAMETER_PROGRAM, source.as_bytes())
    }

    /// Set the shot count. Backends default to 1024 if never set.
    pub fn set_shots(&self, shots: u64) -> Result<()> {
        self.set_parameter(ffi::QDAP_JOB_PARAMETER_SHOTSNUM, &shots.to_ne_bytes())
    }

    // -----------------------------------------------------------------------
    // Job properties
    // -----------------------------------------------------------------------

    /// Query a job property. Returns the raw value bytes.
    pub fn raw_query_property(&self, prop: ffi::JobPropertyKey) -> Result<Vec<u8>> {
        let f = self.session.device.table.fn_job_query_property;
        let handle = self.handle;
        let mut call = move |size, value, size_ret| unsafe {
            f(handle, prop, size, value, size_ret)
        };
        codec::read_two_phase(&mut call, "job_query_property")
    }

    /// The backend-assigned job identifier.
    pub fn id(&self) -> Result<String> {
        let buf = self.raw_query_property(ffi::QDAP_JOB_PROPERTY_ID)?;
        codec::decode_cstring(&buf, "job_query_property")
    }

    /// The effective shot count (the backend default until overridden).
    pub fn shots(&self) -> Result<u64> {
        let buf = self.raw_query_property(ffi::QDAP_JOB_PROPERTY_SHOTSNUM)?;
        codec::decode_u64(&buf, "job_query_property")
    }

    // -----------------------------------------------------------------------
    // Lifecycle
    // -----------------------------------------------------------------------

    /// Submit the job for execution.
    ///
    /// Transitions CREATED → SUBMITTED. The backend is allowed to complete
    /// synchronously; observe completion via [`Job::check`] or [`Job::wait`].
    pub fn submit(&self) -> Result<()> {
        self.require_created("submit")?;
        let ret = unsafe { (self.session.device.table.fn_job_submit)(self.handle) };
        check(ret, "job_submit")?;
        self.status.set(JobStatus::Submitted);
        Ok(())
    }

    /// Check the current status (non-blocking) and refresh the mirror.
    pub fn check(&self) -> Result<JobStatus> {
        let mut raw: ffi::RawJobStatus = 0;
        let ret = unsafe { (self.session.device.table.fn_job_check)(self.handle, &mut raw) };
        check(ret, "job_check")?;
        let status = JobStatus::from_raw(raw)?;
        self.status.set(status);
        Ok(status)
    }

    /// Block until the job reaches a terminal state or the timeout elapses.
    ///
    /// A zero timeout is a single non-blocking poll. If the deadline passes
    /// before the job completes, the result is [`QdapError::Timeout`],
    /// distinct from every other failure. Waiting on an already terminal
    /// job returns immediately with its status.
    pub fn wait(&self, timeout: Duration) -> Result<JobStatus> {
        if self.status.get().is_terminal() {
            return Ok(self.status.get());
        }

        let timeout_ms = usize::try_from(timeout.as_millis()).unwrap_or(usize::MAX);
        let ret = unsafe { (self.session.device.table.fn_job_wait)(self.handle, timeout_ms) };
        check(ret, "job_wait")?;
        self.check()
    }

    /// Request cancellation. Best-effort: a job that already completed is
    /// left untouched — cancel never resurrects a DONE job.
    pub fn cancel(&self) -> Result<JobStatus> {
        if self.status.get() == JobStatus::Done {
            return Ok(JobStatus::Done);
        }
        let ret = unsafe { (self.session.device.table.fn_job_cancel)(self.handle) };
        check(ret, "job_cancel")?;
        self.check()
    }

    // -----------------------------------------------------------------------
    // Results
    // -----------------------------------------------------------------------

    /// Read one result channel. Only valid once the job is DONE; the mirror
    /// is refreshed first so a synchronously completed job works without an
    /// explicit `check`.
    pub fn results(&self, channel: ffi::ResultChannel) -> Result<Vec<u8>> {
        let status = self.check()?;
        if status != JobStatus::Done {
            return Err(QdapError::BadState(format!(
                "job results are only available once the job is done (status: {status:?})"
            )));
        }

        let f = self.session.device.table.fn_job_get_results;
        let handle = self.handle;
        let mut call = move |size, value, size_ret| unsafe {
            f(handle, channel, size, value, size_ret)
        };
        codec::read_two_phase(&mut call, "job_get_results")
    }

    /// Fetch the measurement histogram: outcome bitstrings with counts.
    ///
    /// Reads the two histogram channels and zips them; a backend reporting
    /// mismatched channel lengths is rejected.
    pub fn histogram(&self) -> Result<Vec<(String, u64)>> {
        let keys_buf = self.results(ffi::QDAP_JOB_RESULT_HISTKEYS)?;
        let keys = codec::decode_cstring_list(&keys_buf, "job_get_results")?;

        let values_buf = self.results(ffi::QDAP_JOB_RESULT_HISTVALUES)?;
        if values_buf.len() != keys.len() * std::mem::size_of::<u64>() {
            return Err(QdapError::DecodeError(format!(
                "histogram channels disagree: {} keys but {} value bytes",
                keys.len(),
                values_buf.len()
            )));
        }
        let counts: Vec<u64> = values_buf
            .chunks_exact(std::mem::size_of::<u64>())
            .map(|c| u64::from_ne_bytes(c.try_into().expect("chunk is 8 bytes")))
            .collect();

        Ok(keys.into_iter().zip(counts).collect())
    }

    // -----------------------------------------------------------------------

    fn require_created(&self, op: &str) -> Result<()> {
        let status = self.status.get();
        if status == JobStatus::Created {
            Ok(())
        } else {
            Err(QdapError::BadState(format!(
                "'{op}' requires a job in the created state (status: {status:?})"
            )))
        }
    }
}

impl Drop for Job<'_, '_> {
    fn drop(&mut self) {
        // Releases the backend handle and any program payload it copied.
        unsafe { (self.session.device.table.fn_job_free)(self.handle) };
        tracing::debug!(
            "freed job on device '{}'",
            self.session.device.prefix()
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_codes_round_trip() {
        for (raw, status) in [
            (ffi::QDAP_JOB_STATUS_CREATED, JobStatus::Created),
            (ffi::QDAP_JOB_STATUS_SUBMITTED, JobStatus::Submitted),
            (ffi::QDAP_JOB_STATUS_QUEUED, JobStatus::Queued),
            (ffi::QDAP_JOB_STATUS_RUNNING, JobStatus::Running),
            (ffi::QDAP_JOB_STATUS_DONE, JobStatus::Done),
            (ffi::QDAP_JOB_STATUS_CANCELLED, JobStatus::Cancelled),
            (ffi::QDAP_JOB_STATUS_FAILED, JobStatus::Failed),
        ] {
            assert_eq!(JobStatus::from_raw(raw).unwrap(), status);
        }
        assert!(JobStatus::from_raw(42).is_err());
    }

    #[test]
    fn terminal_states() {
        assert!(JobStatus::Done.is_terminal());
        assert!(JobStatus::Cancelled.is_terminal());
        assert!(JobStatus::Failed.is_terminal());
        assert!(!JobStatus::Running.is_terminal());
        assert!(!JobStatus::Created.is_terminal());
    }
}
