// SPDX-License-Identifier: Apache-2.0
//! Device session management.
//!
//! A session is the primary handle for all queries and job submission.
//! Sessions follow the protocol's three-phase lifecycle, which the host
//! encodes in the type system so the undefined transitions are
//! unrepresentable:
//!
//! 1. **Alloc** — [`SessionBuilder::allocate`] (requires an initialized
//!    device; yields a builder that cannot run queries)
//! 2. **Configure** — [`SessionBuilder::set_parameter`] and friends
//!    (connection parameters are only meaningful before init)
//! 3. **Init** — [`SessionBuilder::init`] consumes the builder and yields
//!    an active [`Session`]
//!
//! Both builder and session free the backend handle exactly once on drop,
//! so double-free and use-after-free never reach the plugin.

use std::ffi::c_void;
use std::os::raw::c_int;

use crate::capabilities::{OperationToken, SiteToken};
use crate::codec;
use crate::error::{QdapError, Result, check};
use crate::ffi;
use crate::job::Job;
use crate::loader::Device;

/// An allocated but not yet initialized session.
///
/// Only connection parameters may be set in this state; property queries
/// become available on the [`Session`] returned by [`SessionBuilder::init`].
#[derive(Debug)]
pub struct SessionBuilder<'dev> {
    handle: ffi::RawSession,
    device: &'dev Device,
}

impl<'dev> SessionBuilder<'dev> {
    /// Allocate a session on an initialized device.
    ///
    /// # Errors
    ///
    /// [`QdapError::BadState`] if the device's initialize count is zero.
    pub fn allocate(device: &'dev Device) -> Result<Self> {
        if !device.is_initialized() {
            return Err(QdapError::BadState(format!(
                "device '{}' is not initialized; call Device::initialize before allocating a session",
                device.prefix()
            )));
        }

        let mut handle: ffi::RawSession = std::ptr::null_mut();
        let ret = unsafe { (device.table.fn_session_alloc)(&mut handle) };
        check(ret, "session_alloc")?;

        if handle.is_null() {
            return Err(QdapError::SessionError(
                "session_alloc returned a null handle".into(),
            ));
        }

        Ok(Self { handle, device })
    }

    /// Set a raw connection parameter.
    pub fn set_parameter(&mut self, param: ffi::SessionParameterKey, value: &[u8]) -> Result<()> {
        let ret = unsafe {
            (self.device.table.fn_session_set_parameter)(
                self.handle,
                param,
                value.len(),
                value.as_ptr().cast::<c_void>(),
            )
        };
        check(ret, "session_set_parameter")
    }

    /// Set the backend endpoint URL.
    pub fn base_url(&mut self, url: &str) -> Result<()> {
        self.set_parameter(ffi::QDAP_SESSION_PARAMETER_BASEURL, url.as_bytes())
    }

    /// Set the backend credential token.
    pub fn token(&mut self, token: &str) -> Result<()> {
        self.set_parameter(ffi::QDAP_SESSION_PARAMETER_TOKEN, token.as_bytes())
    }

    /// Initialize the session, transitioning it to the active state.
    ///
    /// On failure the allocated handle is freed; the builder is consumed
    /// either way.
    pub fn init(self) -> Result<Session<'dev>> {
        let ret = unsafe { (self.device.table.fn_session_init)(self.handle) };
        check(ret, "session_init")?;

        let (handle, device) = (self.handle, self.device);
        std::mem::forget(self);

        tracing::debug!("opened session on device '{}' ({handle:?})", device.prefix());
        Ok(Session { handle, device })
    }
}

impl Drop for SessionBuilder<'_> {
    fn drop(&mut self) {
        unsafe { (self.device.table.fn_session_free)(self.handle) };
    }
}

/// An active session with a QDAP backend.
///
/// All query and job operations require an active session. Sessions are not
/// `Send` or `Sync`: the protocol does not guarantee thread-safety within a
/// single session, so concurrent use must go through separate sessions or
/// external serialization.
pub struct Session<'dev> {
    pub(crate) handle: ffi::RawSession,
    pub(crate) device: &'dev Device,
}

impl<'dev> Session<'dev> {
    /// Allocate and initialize a session with no connection parameters.
    pub fn open(device: &'dev Device) -> Result<Self> {
        SessionBuilder::allocate(device)?.init()
    }

    /// The device this session belongs to.
    pub fn device(&self) -> &'dev Device {
        self.device
    }

    // -----------------------------------------------------------------------
    // Raw property queries (two-phase codec)
    // -----------------------------------------------------------------------

    fn device_property_call(
        &self,
        prop: ffi::DevicePropertyKey,
    ) -> impl FnMut(usize, *mut c_void, *mut usize) -> c_int {
        let f = self.device.table.fn_query_device_property;
        let handle = self.handle;
        move |size, value, size_ret| unsafe { f(handle, prop, size, value, size_ret) }
    }

    /// Query a device-level property. Returns the raw value bytes.
    pub fn raw_query_device_property(&self, prop: ffi::DevicePropertyKey) -> Result<Vec<u8>> {
        codec::read_two_phase(&mut self.device_property_call(prop), "query_device_property")
    }

    /// Probe the byte size of a device property without reading it.
    pub fn probe_device_property(&self, prop: ffi::DevicePropertyKey) -> Result<usize> {
        codec::probe(&mut self.device_property_call(prop), "query_device_property")
    }

    /// Fill a caller-supplied buffer with a device property value, for
    /// callers that already know an upper bound on the size. Returns the
    /// true value size reported by the backend.
    pub fn read_device_property_into(
        &self,
        prop: ffi::DevicePropertyKey,
        buf: &mut [u8],
    ) -> Result<usize> {
        codec::fill_into(
            &mut self.device_property_call(prop),
            buf,
            "query_device_property",
        )
    }

    /// Query a site-level property. Returns the raw value bytes.
    pub fn raw_query_site_property(
        &self,
        site: SiteToken,
        prop: ffi::SitePropertyKey,
    ) -> Result<Vec<u8>> {
        let f = self.device.table.fn_query_site_property;
        let handle = self.handle;
        let mut call = move |size, value, size_ret| unsafe {
            f(handle, site.as_raw(), prop, size, value, size_ret)
        };
        codec::read_two_phase(&mut call, "query_site_property")
    }

    /// Query an operation-level property. Returns the raw value bytes.
    pub fn raw_query_operation_property(
        &self,
        operation: OperationToken,
        prop: ffi::OperationPropertyKey,
    ) -> Result<Vec<u8>> {
        let f = self.device.table.fn_query_operation_property;
        let handle = self.handle;
        let mut call = move |size, value, size_ret| unsafe {
            f(handle, operation.as_raw(), prop, size, value, size_ret)
        };
        codec::read_two_phase(&mut call, "query_operation_property")
    }

    // -----------------------------------------------------------------------
    // Typed convenience queries
    // -----------------------------------------------------------------------

    /// Query a device property as a NUL-terminated string.
    pub fn query_device_string(&self, prop: ffi::DevicePropertyKey) -> Result<String> {
        let buf = self.raw_query_device_property(prop)?;
        codec::decode_cstring(&buf, "query_device_property")
    }

    /// Query a device property as a `usize`.
    pub fn query_device_usize(&self, prop: ffi::DevicePropertyKey) -> Result<usize> {
        let buf = self.raw_query_device_property(prop)?;
        codec::decode_usize(&buf, "query_device_property")
    }

    /// Query a device property as an `f64`.
    pub fn query_device_f64(&self, prop: ffi::DevicePropertyKey) -> Result<f64> {
        let buf = self.raw_query_device_property(prop)?;
        codec::decode_f64(&buf, "query_device_property")
    }

    /// Query a device property as an `i32` status/enum code.
    pub fn query_device_i32(&self, prop: ffi::DevicePropertyKey) -> Result<i32> {
        let buf = self.raw_query_device_property(prop)?;
        codec::decode_i32(&buf, "query_device_property")
    }

    /// Query a site property as a `u64`, mapping NotSupported to `None`.
    pub fn query_site_u64_optional(
        &self,
        site: SiteToken,
        prop: ffi::SitePropertyKey,
    ) -> Result<Option<u64>> {
        absent_if_unsupported(
            self.raw_query_site_property(site, prop)
                .and_then(|buf| codec::decode_u64(&buf, "query_site_property")),
        )
    }

    /// Query a site property as a `usize`, mapping NotSupported to `None`.
    pub fn query_site_usize_optional(
        &self,
        site: SiteToken,
        prop: ffi::SitePropertyKey,
    ) -> Result<Option<usize>> {
        absent_if_unsupported(
            self.raw_query_site_property(site, prop)
                .and_then(|buf| codec::decode_usize(&buf, "query_site_property")),
        )
    }

    /// Query a site property as a string, mapping NotSupported to `None`.
    pub fn query_site_string_optional(
        &self,
        site: SiteToken,
        prop: ffi::SitePropertyKey,
    ) -> Result<Option<String>> {
        absent_if_unsupported(
            self.raw_query_site_property(site, prop)
                .and_then(|buf| codec::decode_cstring(&buf, "query_site_property")),
        )
    }

    /// Query an operation property as an `f64`, mapping NotSupported to `None`.
    pub fn query_operation_f64_optional(
        &self,
        operation: OperationToken,
        prop: ffi::OperationPropertyKey,
    ) -> Result<Option<f64>> {
        absent_if_unsupported(
            self.raw_query_operation_property(operation, prop)
                .and_then(|buf| codec::decode_f64(&buf, "query_operation_property")),
        )
    }

    /// Query an operation property as a `u64`, mapping NotSupported to `None`.
    pub fn query_operation_u64_optional(
        &self,
        operation: OperationToken,
        prop: ffi::OperationPropertyKey,
    ) -> Result<Option<u64>> {
        absent_if_unsupported(
            self.raw_query_operation_property(operation, prop)
                .and_then(|buf| codec::decode_u64(&buf, "query_operation_property")),
        )
    }

    /// Query an operation property as a `usize`, mapping NotSupported to `None`.
    pub fn query_operation_usize_optional(
        &self,
        operation: OperationToken,
        prop: ffi::OperationPropertyKey,
    ) -> Result<Option<usize>> {
        absent_if_unsupported(
            self.raw_query_operation_property(operation, prop)
                .and_then(|buf| codec::decode_usize(&buf, "query_operation_property")),
        )
    }

    /// Query an operation property as a string, mapping NotSupported to `None`.
    pub fn query_operation_string_optional(
        &self,
        operation: OperationToken,
        prop: ffi::OperationPropertyKey,
    ) -> Result<Option<String>> {
        absent_if_unsupported(
            self.raw_query_operation_property(operation, prop)
                .and_then(|buf| codec::decode_cstring(&buf, "query_operation_property")),
        )
    }

    // -----------------------------------------------------------------------
    // Job creation
    // -----------------------------------------------------------------------

    /// Create a new device job on this session.
    pub fn create_job(&self) -> Result<Job<'_, 'dev>> {
        let mut handle: ffi::RawJob = std::ptr::null_mut();
        let ret = unsafe { (self.device.table.fn_create_device_job)(self.handle, &mut handle) };
        check(ret, "create_device_job")?;

        if handle.is_null() {
            return Err(QdapError::SessionError(
                "create_device_job returned a null handle".into(),
            ));
        }

        Ok(Job::new(handle, self))
    }
}

impl Drop for Session<'_> {
    fn drop(&mut self) {
        unsafe { (self.device.table.fn_session_free)(self.handle) };
        tracing::debug!("freed session on device '{}'", self.device.prefix());
    }
}

/// Recover a NotSupported query to "value absent" without aborting a scan.
fn absent_if_unsupported<T>(result: Result<T>) -> Result<Option<T>> {
    match result {
        Ok(v) => Ok(Some(v)),
        Err(QdapError::NotSupported) => Ok(None),
        Err(e) => Err(e),
    }
}
