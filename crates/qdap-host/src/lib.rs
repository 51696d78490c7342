// SPDX-License-Identifier: Apache-2.0
//! # qdap-host
//!
//! Host-side runtime for QDAP (Quantum Device Abstraction Protocol)
//! hardware backends.
//!
//! A QDAP backend is a shared library exporting a fixed set of C entry
//! points under a per-backend name prefix. This crate loads such libraries
//! via `dlopen`, resolves the prefix-shifted symbols, and wraps the raw
//! C ABI in safe RAII types for device, session and job lifecycles plus a
//! structured capability model.
//!
//! ## Architecture
//!
//! ```text
//!                  ┌──────────────────┐
//!                  │    Embedder      │
//!                  └────────┬─────────┘
//!                           │ DeviceCapabilities, Job results
//!                  ┌────────┴─────────┐
//!                  │    qdap-host     │
//!                  │                  │
//!                  │  DeviceRegistry  │ ← prefix → Device map
//!                  │  Device          │ ← dlopen + prefix-aware dlsym
//!                  │  Session         │ ← typestate session lifecycle
//!                  │  Job             │ ← submit / wait / results
//!                  │  DeviceCapab.    │ ← structured query results
//!                  └────────┬─────────┘
//!                           │ C ABI (extern "C")
//!               ┌───────────┴───────────┐
//!               │  QDAP backend .so     │
//!               │  (e.g. MOCK_, IQM_)   │
//!               └───────────────────────┘
//! ```
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use std::path::Path;
//! use qdap_host::{Device, DeviceCapabilities, Session};
//!
//! // Load a backend library with its symbol prefix.
//! let device = Device::load(Path::new("libqdap_mock.so"), "MOCK")
//!     .expect("failed to load backend");
//! device.initialize().expect("failed to initialize device");
//!
//! // Open a session (alloc → configure → init).
//! let session = Session::open(&device).expect("failed to open session");
//!
//! // Query all capabilities.
//! let caps = DeviceCapabilities::query(&session)
//!     .expect("failed to query capabilities");
//!
//! println!("Device: {} ({} qubits)", caps.name, caps.num_qubits);
//! println!("Coupling edges: {}", caps.coupling_map.num_edges());
//!
//! for (site, props) in &caps.site_properties {
//!     if let Some(t1) = props.t1 {
//!         println!("  Site {:?}: T1 = {:?}", site, t1);
//!     }
//! }
//! ```

pub mod capabilities;
pub(crate) mod codec;
pub mod error;
pub mod ffi;
pub mod format;
pub mod job;
pub mod loader;
pub mod registry;
pub mod session;

// Re-export the most commonly used types at crate root.
pub use capabilities::{
    CouplingMap, DeviceCapabilities, DeviceStatus, OperationProperties, OperationToken,
    SiteProperties, SiteToken,
};
pub use error::QdapError;
pub use format::{ProgramFormat, negotiate_format};
pub use job::{Job, JobStatus};
pub use loader::{Device, ENTRY_POINTS};
pub use registry::DeviceRegistry;
pub use session::{Session, SessionBuilder};
