// SPDX-License-Identifier: Apache-2.0
//! Raw FFI constants and type definitions for the QDAP v1 **device** interface.
//!
//! QDAP (Quantum Device Abstraction Protocol) backends are shared libraries
//! that export a fixed set of 18 entry points, name-shifted by a
//! backend-specific prefix. All function pointers are resolved at runtime
//! from the backend library; nothing is linked statically.
//!
//! The integer values in this module *are* the wire contract: a backend and
//! a host that disagree on any of them cannot interoperate.

use std::ffi::c_void;
use std::os::raw::c_int;

// ===========================================================================
// Opaque handle types
// ===========================================================================

/// Opaque device session handle (`PREFIX_QDAP_Device_Session`).
pub type RawSession = *mut c_void;

/// Opaque site handle (`QDAP_Site`). Backend-owned; never dereferenced.
pub type RawSite = *mut c_void;

/// Opaque operation handle (`QDAP_Operation`). Backend-owned; never dereferenced.
pub type RawOperation = *mut c_void;

/// Opaque device job handle (`PREFIX_QDAP_Device_Job`).
pub type RawJob = *mut c_void;

// ===========================================================================
// Status codes (QDAP_STATUS)
// ===========================================================================

pub const QDAP_SUCCESS: c_int = 0;
pub const QDAP_WARN_GENERAL: c_int = 1;
pub const QDAP_ERROR_FATAL: c_int = -1;
pub const QDAP_ERROR_OUTOFMEM: c_int = -2;
pub const QDAP_ERROR_NOTIMPLEMENTED: c_int = -3;
pub const QDAP_ERROR_LIBNOTFOUND: c_int = -4;
pub const QDAP_ERROR_NOTFOUND: c_int = -5;
pub const QDAP_ERROR_OUTOFRANGE: c_int = -6;
pub const QDAP_ERROR_INVALIDARGUMENT: c_int = -7;
pub const QDAP_ERROR_PERMISSIONDENIED: c_int = -8;
pub const QDAP_ERROR_NOTSUPPORTED: c_int = -9;
pub const QDAP_ERROR_BADSTATE: c_int = -10;
pub const QDAP_ERROR_TIMEOUT: c_int = -11;

/// Returns `true` if the status code indicates success.
/// Accepts both `QDAP_SUCCESS` (0) and `QDAP_WARN_GENERAL` (1); warnings are
/// successes with a caveat and are reported through logging, not errors.
#[inline]
pub fn is_success(code: c_int) -> bool {
    code == QDAP_SUCCESS || code == QDAP_WARN_GENERAL
}

// ===========================================================================
// Device property keys (QDAP_DEVICE_PROPERTY_T)
// ===========================================================================

pub type DevicePropertyKey = c_int;

pub const QDAP_DEVICE_PROPERTY_NAME: DevicePropertyKey = 0;
pub const QDAP_DEVICE_PROPERTY_VERSION: DevicePropertyKey = 1;
pub const QDAP_DEVICE_PROPERTY_STATUS: DevicePropertyKey = 2;
pub const QDAP_DEVICE_PROPERTY_LIBRARYVERSION: DevicePropertyKey = 3;
pub const QDAP_DEVICE_PROPERTY_QUBITSNUM: DevicePropertyKey = 4;
pub const QDAP_DEVICE_PROPERTY_SITES: DevicePropertyKey = 5;
pub const QDAP_DEVICE_PROPERTY_OPERATIONS: DevicePropertyKey = 6;
pub const QDAP_DEVICE_PROPERTY_COUPLINGMAP: DevicePropertyKey = 7;
pub const QDAP_DEVICE_PROPERTY_DURATIONUNIT: DevicePropertyKey = 8;
pub const QDAP_DEVICE_PROPERTY_DURATIONSCALEFACTOR: DevicePropertyKey = 9;
pub const QDAP_DEVICE_PROPERTY_SUPPORTEDPROGRAMFORMATS: DevicePropertyKey = 10;

// ===========================================================================
// Site property keys (QDAP_SITE_PROPERTY_T)
// ===========================================================================

pub type SitePropertyKey = c_int;

pub const QDAP_SITE_PROPERTY_INDEX: SitePropertyKey = 0;
pub const QDAP_SITE_PROPERTY_T1: SitePropertyKey = 1;
pub const QDAP_SITE_PROPERTY_T2: SitePropertyKey = 2;
pub const QDAP_SITE_PROPERTY_NAME: SitePropertyKey = 3;

// ===========================================================================
// Operation property keys (QDAP_OPERATION_PROPERTY_T)
// ===========================================================================

pub type OperationPropertyKey = c_int;

pub const QDAP_OPERATION_PROPERTY_NAME: OperationPropertyKey = 0;
pub const QDAP_OPERATION_PROPERTY_QUBITSNUM: OperationPropertyKey = 1;
pub const QDAP_OPERATION_PROPERTY_PARAMETERSNUM: OperationPropertyKey = 2;
pub const QDAP_OPERATION_PROPERTY_DURATION: OperationPropertyKey = 3;
pub const QDAP_OPERATION_PROPERTY_FIDELITY: OperationPropertyKey = 4;

// ===========================================================================
// Session parameters (QDAP_SESSION_PARAMETER_T)
// ===========================================================================

pub type SessionParameterKey = c_int;

pub const QDAP_SESSION_PARAMETER_BASEURL: SessionParameterKey = 0;
pub const QDAP_SESSION_PARAMETER_TOKEN: SessionParameterKey = 1;

// ===========================================================================
// Job parameters (QDAP_JOB_PARAMETER_T)
// ===========================================================================

pub type JobParameterKey = c_int;

pub const QDAP_JOB_PARAMETER_PROGRAMFORMAT: JobParameterKey = 0;
pub const QDAP_JOB_PARAMETER_PROGRAM: JobParameterKey = 1;
pub const QDAP_JOB_PARAMETER_SHOTSNUM: JobParameterKey = 2;

// ===========================================================================
// Job properties (QDAP_JOB_PROPERTY_T)
// ===========================================================================

pub type JobPropertyKey = c_int;

pub const QDAP_JOB_PROPERTY_ID: JobPropertyKey = 0;
pub const QDAP_JOB_PROPERTY_PROGRAMFORMAT: JobPropertyKey = 1;
pub const QDAP_JOB_PROPERTY_PROGRAM: JobPropertyKey = 2;
pub const QDAP_JOB_PROPERTY_SHOTSNUM: JobPropertyKey = 3;

// ===========================================================================
// Job status (QDAP_JOB_STATUS_T)
// ===========================================================================

pub type RawJobStatus = c_int;

pub const QDAP_JOB_STATUS_CREATED: RawJobStatus = 0;
pub const QDAP_JOB_STATUS_SUBMITTED: RawJobStatus = 1;
pub const QDAP_JOB_STATUS_QUEUED: RawJobStatus = 2;
pub const QDAP_JOB_STATUS_RUNNING: RawJobStatus = 3;
pub const QDAP_JOB_STATUS_DONE: RawJobStatus = 4;
pub const QDAP_JOB_STATUS_CANCELLED: RawJobStatus = 5;
pub const QDAP_JOB_STATUS_FAILED: RawJobStatus = 6;

// ===========================================================================
// Device status (QDAP_DEVICE_STATUS_T)
// ===========================================================================

pub type RawDeviceStatus = c_int;

pub const QDAP_DEVICE_STATUS_OFFLINE: RawDeviceStatus = 0;
pub const QDAP_DEVICE_STATUS_IDLE: RawDeviceStatus = 1;
pub const QDAP_DEVICE_STATUS_BUSY: RawDeviceStatus = 2;
pub const QDAP_DEVICE_STATUS_ERROR: RawDeviceStatus = 3;
pub const QDAP_DEVICE_STATUS_MAINTENANCE: RawDeviceStatus = 4;
pub const QDAP_DEVICE_STATUS_CALIBRATION: RawDeviceStatus = 5;

// ===========================================================================
// Program formats (QDAP_PROGRAM_FORMAT_T)
// ===========================================================================

pub type RawProgramFormat = c_int;

pub const QDAP_PROGRAM_FORMAT_QASM2: RawProgramFormat = 0;
pub const QDAP_PROGRAM_FORMAT_QASM3: RawProgramFormat = 1;
pub const QDAP_PROGRAM_FORMAT_QIRSTRING: RawProgramFormat = 2;

// ===========================================================================
// Job result channels (QDAP_JOB_RESULT_T)
// ===========================================================================

pub type ResultChannel = c_int;

pub const QDAP_JOB_RESULT_SHOTS: ResultChannel = 0;
pub const QDAP_JOB_RESULT_HISTKEYS: ResultChannel = 1;
pub const QDAP_JOB_RESULT_HISTVALUES: ResultChannel = 2;

// ===========================================================================
// Function pointer types — QDAP device interface
//
// Every QDAP backend library exports 18 functions with a backend-specific
// prefix. For example the "MOCK" backend exports:
//   MOCK_QDAP_device_initialize
//   MOCK_QDAP_device_finalize
//   MOCK_QDAP_device_session_alloc
//   MOCK_QDAP_device_session_set_parameter
//   MOCK_QDAP_device_session_init
//   MOCK_QDAP_device_session_free
//   MOCK_QDAP_device_session_query_device_property
//   MOCK_QDAP_device_session_query_site_property
//   MOCK_QDAP_device_session_query_operation_property
//   MOCK_QDAP_device_session_create_device_job
//   MOCK_QDAP_device_job_set_parameter
//   MOCK_QDAP_device_job_query_property
//   MOCK_QDAP_device_job_submit
//   MOCK_QDAP_device_job_cancel
//   MOCK_QDAP_device_job_check
//   MOCK_QDAP_device_job_wait
//   MOCK_QDAP_device_job_get_results
//   MOCK_QDAP_device_job_free
// ===========================================================================

// -- Device lifecycle (2) ---------------------------------------------------

/// `int PREFIX_QDAP_device_initialize(void)`
pub type FnDeviceInitialize = unsafe extern "C" fn() -> c_int;

/// `int PREFIX_QDAP_device_finalize(void)`
pub type FnDeviceFinalize = unsafe extern "C" fn() -> c_int;

// -- Session lifecycle (4) --------------------------------------------------

/// `int PREFIX_QDAP_device_session_alloc(PREFIX_QDAP_Device_Session *session)`
pub type FnSessionAlloc = unsafe extern "C" fn(session_out: *mut RawSession) -> c_int;

/// `int PREFIX_QDAP_device_session_set_parameter(session, param, size, value)`
pub type FnSessionSetParameter = unsafe extern "C" fn(
    session: RawSession,
    param: SessionParameterKey,
    size: usize,
    value: *const c_void,
) -> c_int;

/// `int PREFIX_QDAP_device_session_init(PREFIX_QDAP_Device_Session session)`
pub type FnSessionInit = unsafe extern "C" fn(session: RawSession) -> c_int;

/// `void PREFIX_QDAP_device_session_free(PREFIX_QDAP_Device_Session session)`
pub type FnSessionFree = unsafe extern "C" fn(session: RawSession);

// -- Query interface (3) ----------------------------------------------------

/// `int PREFIX_QDAP_device_session_query_device_property(session, prop, size, value, size_ret)`
pub type FnQueryDeviceProperty = unsafe extern "C" fn(
    session: RawSession,
    prop: DevicePropertyKey,
    size: usize,
    value: *mut c_void,
    size_ret: *mut usize,
) -> c_int;

/// `int PREFIX_QDAP_device_session_query_site_property(session, site, prop, size, value, size_ret)`
pub type FnQuerySiteProperty = unsafe extern "C" fn(
    session: RawSession,
    site: RawSite,
    prop: SitePropertyKey,
    size: usize,
    value: *mut c_void,
    size_ret: *mut usize,
) -> c_int;

/// `int PREFIX_QDAP_device_session_query_operation_property(session, operation, prop, size, value, size_ret)`
pub type FnQueryOperationProperty = unsafe extern "C" fn(
    session: RawSession,
    operation: RawOperation,
    prop: OperationPropertyKey,
    size: usize,
    value: *mut c_void,
    size_ret: *mut usize,
) -> c_int;

// -- Job interface (9) ------------------------------------------------------

/// `int PREFIX_QDAP_device_session_create_device_job(session, job_out)`
pub type FnCreateDeviceJob =
    unsafe extern "C" fn(session: RawSession, job_out: *mut RawJob) -> c_int;

/// `int PREFIX_QDAP_device_job_set_parameter(job, param, size, value)`
pub type FnJobSetParameter = unsafe extern "C" fn(
    job: RawJob,
    param: JobParameterKey,
    size: usize,
    value: *const c_void,
) -> c_int;

/// `int PREFIX_QDAP_device_job_query_property(job, prop, size, value, size_ret)`
pub type FnJobQueryProperty = unsafe extern "C" fn(
    job: RawJob,
    prop: JobPropertyKey,
    size: usize,
    value: *mut c_void,
    size_ret: *mut usize,
) -> c_int;

/// `int PREFIX_QDAP_device_job_submit(job)`
pub type FnJobSubmit = unsafe extern "C" fn(job: RawJob) -> c_int;

/// `int PREFIX_QDAP_device_job_cancel(job)`
pub type FnJobCancel = unsafe extern "C" fn(job: RawJob) -> c_int;

/// `int PREFIX_QDAP_device_job_check(job, status_out)`
pub type FnJobCheck = unsafe extern "C" fn(job: RawJob, status: *mut RawJobStatus) -> c_int;

/// `int PREFIX_QDAP_device_job_wait(job, timeout_ms)`
///
/// `timeout_ms == 0` is a single non-blocking poll: the backend returns
/// success if the job is already terminal and `QDAP_ERROR_TIMEOUT` otherwise.
pub type FnJobWait = unsafe extern "C" fn(job: RawJob, timeout_ms: usize) -> c_int;

/// `int PREFIX_QDAP_device_job_get_results(job, channel, size, value, size_ret)`
pub type FnJobGetResults = unsafe extern "C" fn(
    job: RawJob,
    channel: ResultChannel,
    size: usize,
    value: *mut c_void,
    size_ret: *mut usize,
) -> c_int;

/// `void PREFIX_QDAP_device_job_free(job)`
pub type FnJobFree = unsafe extern "C" fn(job: RawJob);
