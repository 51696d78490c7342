// SPDX-License-Identifier: Apache-2.0
//! Integration tests using the compiled mock QDAP backend.
//!
//! The build.rs compiles `tests/mock_device/mock_device.c` into
//! `libqdap_mock_device.so` and exports its path via the
//! `QDAP_MOCK_DEVICE_PATH` env var.
//!
//! The mock keeps process-global device state (as real backends do), so
//! every test serializes on a shared lock instead of relying on cargo's
//! default parallelism.

use std::path::Path;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use qdap_host::{
    Device, DeviceCapabilities, DeviceRegistry, DeviceStatus, JobStatus, ProgramFormat, QdapError,
    Session, SessionBuilder, ffi, negotiate_format,
};

static DEVICE_LOCK: Mutex<()> = Mutex::new(());

/// Serialize access to the mock backend's global state.
fn guard() -> MutexGuard<'static, ()> {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
    DEVICE_LOCK.lock().unwrap_or_else(|e| e.into_inner())
}

/// Path to the compiled mock backend .so (set by build.rs).
fn mock_device_path() -> &'static str {
    env!("QDAP_MOCK_DEVICE_PATH")
}

fn load_mock() -> Device {
    Device::load(Path::new(mock_device_path()), "MOCK").expect("failed to load mock QDAP backend")
}

fn open_initialized() -> Device {
    let device = load_mock();
    device.initialize().expect("device initialize failed");
    device
}

const BELL_QASM: &str = "OPENQASM 2.0;\nqreg q[2];\ncreg c[2];\nh q[0];\ncx q[0],q[1];\nmeasure q -> c;\n";

// ---------------------------------------------------------------------------
// Loading & symbol resolution
// ---------------------------------------------------------------------------

#[test]
fn load_mock_backend() {
    let _g = guard();
    let device = load_mock();
    assert_eq!(device.prefix(), "MOCK");
    assert_eq!(device.library_path(), mock_device_path());
    // Loading resolves symbols but runs no backend code.
    assert!(!device.is_initialized());
    assert_eq!(device.init_count(), 0);
}

#[test]
fn load_nonexistent_library_fails() {
    let _g = guard();
    let err = Device::load(Path::new("/nonexistent/libfoo.so"), "FOO").unwrap_err();
    assert!(matches!(err, QdapError::LoadFailed { .. }));
}

#[test]
fn wrong_prefix_reports_all_missing_symbols() {
    let _g = guard();
    let err = Device::load(Path::new(mock_device_path()), "WRONG").unwrap_err();
    match err {
        QdapError::MissingSymbols { prefix, missing, .. } => {
            assert_eq!(prefix, "WRONG");
            // Every entry point is absent under the wrong prefix, and the
            // error lists them all at once.
            assert_eq!(missing.len(), 18);
            assert!(missing.contains(&"WRONG_QDAP_device_initialize".to_string()));
            assert!(missing.contains(&"WRONG_QDAP_device_job_free".to_string()));
        }
        other => panic!("expected MissingSymbols, got {other:?}"),
    }
}

#[test]
fn loading_runs_no_backend_code() {
    let _g = guard();
    let device = load_mock();
    // The mock rejects session allocation until device_initialize has run;
    // if loading had called it, this would succeed.
    let err = SessionBuilder::allocate(&device).unwrap_err();
    assert!(matches!(err, QdapError::BadState(_)));
}

// ---------------------------------------------------------------------------
// Device lifecycle reference counting
// ---------------------------------------------------------------------------

#[test]
fn initialize_finalize_reference_counting() {
    let _g = guard();
    let device = load_mock();

    device.initialize().unwrap();
    device.initialize().unwrap();
    assert_eq!(device.init_count(), 2);

    device.finalize();
    assert!(device.is_initialized());

    device.finalize();
    assert!(!device.is_initialized());

    // Finalize past zero is a clamped no-op.
    device.finalize();
    assert_eq!(device.init_count(), 0);

    // The library stays mapped; re-initialization works without a reload.
    device.initialize().unwrap();
    let _session = Session::open(&device).unwrap();
}

#[test]
fn concurrent_initialize_finalize_keeps_count_and_backend_in_step() {
    let _g = guard();
    let device = Arc::new(load_mock());

    // Hammer the 0 ↔ 1 transitions from several threads. Each thread holds
    // its own initialization while it opens a session, so the backend must
    // be live at that moment no matter how the other threads interleave.
    let workers: Vec<_> = (0..4)
        .map(|_| {
            let device = Arc::clone(&device);
            std::thread::spawn(move || {
                for _ in 0..200 {
                    device.initialize().expect("initialize failed");
                    {
                        let _session = Session::open(&device)
                            .expect("session open against an initialized device");
                    }
                    device.finalize();
                }
            })
        })
        .collect();
    for worker in workers {
        worker.join().expect("worker thread panicked");
    }

    // All initializations were matched by finalizes, and the count agrees
    // with the backend: allocation is rejected until the next initialize.
    assert_eq!(device.init_count(), 0);
    assert!(matches!(
        SessionBuilder::allocate(&device),
        Err(QdapError::BadState(_))
    ));

    device.initialize().unwrap();
    let _session = Session::open(&device).unwrap();
}

#[test]
fn session_allocation_requires_initialized_device() {
    let _g = guard();
    let device = load_mock();
    match SessionBuilder::allocate(&device) {
        Err(QdapError::BadState(msg)) => assert!(msg.contains("MOCK")),
        other => panic!("expected BadState, got {other:?}"),
    }
}

// ---------------------------------------------------------------------------
// Session lifecycle
// ---------------------------------------------------------------------------

#[test]
fn open_and_reopen_session() {
    let _g = guard();
    let device = open_initialized();
    {
        let _session = Session::open(&device).expect("session open failed");
        // session drops here (session_free called)
    }
    let _session2 = Session::open(&device).expect("second session open failed");
}

#[test]
fn session_with_connection_parameters() {
    let _g = guard();
    let device = open_initialized();

    let mut builder = SessionBuilder::allocate(&device).unwrap();
    builder.base_url("https://example.com/api").unwrap();
    builder.token("my-test-token").unwrap();
    let session = builder.init().expect("session init failed");

    // The session is live and queryable afterwards.
    let name = session
        .query_device_string(ffi::QDAP_DEVICE_PROPERTY_NAME)
        .unwrap();
    assert!(!name.is_empty());
}

#[test]
fn oversized_session_parameter_is_rejected() {
    let _g = guard();
    let device = open_initialized();

    let mut builder = SessionBuilder::allocate(&device).unwrap();
    let long_url = "x".repeat(4096);
    let err = builder.base_url(&long_url).unwrap_err();
    assert!(matches!(err, QdapError::InvalidArgument(_)));

    // The session is still usable after the rejected parameter.
    builder.base_url("https://example.com").unwrap();
    let _session = builder.init().unwrap();
}

// ---------------------------------------------------------------------------
// Device-level property queries
// ---------------------------------------------------------------------------

#[test]
fn query_device_name_and_version() {
    let _g = guard();
    let device = open_initialized();
    let session = Session::open(&device).unwrap();

    let name = session
        .query_device_string(ffi::QDAP_DEVICE_PROPERTY_NAME)
        .unwrap();
    assert_eq!(name, "QDAP Mock Device (5Q Linear)");

    let version = session
        .query_device_string(ffi::QDAP_DEVICE_PROPERTY_VERSION)
        .unwrap();
    assert_eq!(version, "0.1.0");

    let qubits = session
        .query_device_usize(ffi::QDAP_DEVICE_PROPERTY_QUBITSNUM)
        .unwrap();
    assert_eq!(qubits, 5);
}

#[test]
fn probe_size_matches_value_size() {
    let _g = guard();
    let device = open_initialized();
    let session = Session::open(&device).unwrap();

    let probed = session
        .probe_device_property(ffi::QDAP_DEVICE_PROPERTY_NAME)
        .unwrap();
    let value = session
        .raw_query_device_property(ffi::QDAP_DEVICE_PROPERTY_NAME)
        .unwrap();
    assert_eq!(probed, value.len());
    // C string including the NUL terminator.
    assert_eq!(probed, "QDAP Mock Device (5Q Linear)".len() + 1);
}

#[test]
fn caller_supplied_buffer_path() {
    let _g = guard();
    let device = open_initialized();
    let session = Session::open(&device).unwrap();

    // Oversized buffer: succeeds and reports the true size.
    let mut buf = [0u8; 256];
    let written = session
        .read_device_property_into(ffi::QDAP_DEVICE_PROPERTY_VERSION, &mut buf)
        .unwrap();
    assert_eq!(&buf[..written], b"0.1.0\0");

    // Undersized buffer: rejected with no partial write.
    let mut small = [0xAAu8; 2];
    let err = session
        .read_device_property_into(ffi::QDAP_DEVICE_PROPERTY_VERSION, &mut small)
        .unwrap_err();
    assert!(matches!(err, QdapError::InvalidArgument(_)));
    assert_eq!(small, [0xAAu8; 2]);
}

#[test]
fn unknown_property_is_not_supported() {
    let _g = guard();
    let device = open_initialized();
    let session = Session::open(&device).unwrap();

    let err = session.raw_query_device_property(999).unwrap_err();
    assert!(matches!(err, QdapError::NotSupported));
}

// ---------------------------------------------------------------------------
// Capability scan
// ---------------------------------------------------------------------------

#[test]
fn full_capability_scan() {
    let _g = guard();
    let device = open_initialized();
    let session = Session::open(&device).unwrap();

    let caps = DeviceCapabilities::query(&session).expect("capability scan failed");

    assert_eq!(caps.name, "QDAP Mock Device (5Q Linear)");
    assert_eq!(caps.version.as_deref(), Some("0.1.0"));
    assert_eq!(caps.library_version.as_deref(), Some("1.0.0"));
    assert_eq!(caps.status, Some(DeviceStatus::Idle));
    assert_eq!(caps.num_qubits, 5);
    assert_eq!(caps.sites.len(), 5);
    assert_eq!(caps.operations.len(), 3);
    assert_eq!(caps.duration_unit.as_deref(), Some("ns"));
    assert!((caps.duration_scale_factor - 1e-9).abs() < 1e-24);
    assert_eq!(
        caps.supported_formats,
        vec![ProgramFormat::Qasm2, ProgramFormat::Qasm3]
    );
}

#[test]
fn coupling_map_is_a_line() {
    let _g = guard();
    let device = open_initialized();
    let session = Session::open(&device).unwrap();
    let caps = DeviceCapabilities::query(&session).unwrap();

    let cm = &caps.coupling_map;
    assert_eq!(cm.num_edges(), 8);

    let s = &caps.sites;
    assert!(cm.is_connected(s[0], s[1]));
    assert!(cm.is_connected(s[1], s[0]));
    assert!(!cm.is_connected(s[0], s[2]));
    assert_eq!(cm.distance(s[0], s[4]), Some(4));
    assert_eq!(cm.diameter(), Some(4));
}

#[test]
fn site_properties_are_scaled_durations() {
    let _g = guard();
    let device = open_initialized();
    let session = Session::open(&device).unwrap();
    let caps = DeviceCapabilities::query(&session).unwrap();

    // Site 0: T1 = 100_000 ns ticks at 1e-9 s/tick = 100 µs.
    let site0 = caps
        .sites
        .iter()
        .find(|s| caps.site_properties[s].index == Some(0))
        .expect("site with index 0");
    let props = &caps.site_properties[site0];
    assert_eq!(props.t1, Some(Duration::from_micros(100)));
    assert_eq!(props.t2, Some(Duration::from_micros(50)));
    assert_eq!(props.name.as_deref(), Some("q0"));
}

#[test]
fn operation_properties() {
    let _g = guard();
    let device = open_initialized();
    let session = Session::open(&device).unwrap();
    let caps = DeviceCapabilities::query(&session).unwrap();

    let find = |name: &str| {
        caps.operations
            .iter()
            .find(|op| caps.operation_properties[op].name.as_deref() == Some(name))
            .map(|op| &caps.operation_properties[op])
            .unwrap_or_else(|| panic!("operation '{name}' not reported"))
    };

    let h = find("h");
    assert_eq!(h.num_qubits, Some(1));
    assert_eq!(h.num_parameters, Some(0));
    assert_eq!(h.duration, Some(Duration::from_nanos(30)));

    let cx = find("cx");
    assert_eq!(cx.num_qubits, Some(2));
    assert_eq!(cx.duration, Some(Duration::from_nanos(300)));
    assert!((cx.fidelity.unwrap() - 0.98).abs() < 1e-12);

    let rz = find("rz");
    assert_eq!(rz.num_parameters, Some(1));
    assert_eq!(rz.duration, Some(Duration::from_nanos(20)));
}

#[test]
fn format_negotiation_against_device() {
    let _g = guard();
    let device = open_initialized();
    let session = Session::open(&device).unwrap();
    let caps = DeviceCapabilities::query(&session).unwrap();

    // The mock supports QASM2 and QASM3; the host ranks QASM3 first.
    assert_eq!(
        negotiate_format(&caps.supported_formats, None),
        Some(ProgramFormat::Qasm3)
    );
    // QIR is unsupported, so a QIR preference falls back.
    assert_eq!(
        negotiate_format(&caps.supported_formats, Some(ProgramFormat::QirText)),
        Some(ProgramFormat::Qasm3)
    );
}

// ---------------------------------------------------------------------------
// Job lifecycle
// ---------------------------------------------------------------------------

#[test]
fn job_submit_and_histogram() {
    let _g = guard();
    let device = open_initialized();
    let session = Session::open(&device).unwrap();

    let job = session.create_job().unwrap();
    assert_eq!(job.status(), JobStatus::Created);

    job.set_program(ProgramFormat::Qasm2, BELL_QASM).unwrap();
    job.set_shots(2000).unwrap();
    job.submit().unwrap();

    // The mock completes synchronously.
    assert_eq!(job.check().unwrap(), JobStatus::Done);

    let histogram = job.histogram().unwrap();
    assert_eq!(histogram.len(), 2);
    assert_eq!(histogram[0].0, "00000");
    assert_eq!(histogram[1].0, "11111");
    let total: u64 = histogram.iter().map(|(_, n)| n).sum();
    assert_eq!(total, 2000);
}

#[test]
fn job_id_and_default_shots() {
    let _g = guard();
    let device = open_initialized();
    let session = Session::open(&device).unwrap();

    let job = session.create_job().unwrap();
    assert!(job.id().unwrap().starts_with("mock-job-"));
    // Shot count defaults until overridden.
    assert_eq!(job.shots().unwrap(), 1024);

    job.set_shots(4).unwrap();
    assert_eq!(job.shots().unwrap(), 4);
}

#[test]
fn results_before_completion_are_rejected() {
    let _g = guard();
    let device = open_initialized();
    let session = Session::open(&device).unwrap();

    let job = session.create_job().unwrap();
    job.set_program(ProgramFormat::Qasm2, BELL_QASM).unwrap();

    let err = job.results(ffi::QDAP_JOB_RESULT_HISTKEYS).unwrap_err();
    assert!(matches!(err, QdapError::BadState(_)));
}

#[test]
fn submit_twice_is_rejected_host_side() {
    let _g = guard();
    let device = open_initialized();
    let session = Session::open(&device).unwrap();

    let job = session.create_job().unwrap();
    job.set_program(ProgramFormat::Qasm2, BELL_QASM).unwrap();
    job.submit().unwrap();

    let err = job.submit().unwrap_err();
    assert!(matches!(err, QdapError::BadState(_)));
}

#[test]
fn parameters_are_frozen_after_submit() {
    let _g = guard();
    let device = open_initialized();
    let session = Session::open(&device).unwrap();

    let job = session.create_job().unwrap();
    job.set_program(ProgramFormat::Qasm2, BELL_QASM).unwrap();
    job.submit().unwrap();

    let err = job.set_shots(1).unwrap_err();
    assert!(matches!(err, QdapError::BadState(_)));
}

#[test]
fn wait_zero_is_a_single_poll() {
    let _g = guard();
    let device = open_initialized();
    let session = Session::open(&device).unwrap();

    let job = session.create_job().unwrap();
    job.set_program(ProgramFormat::Qasm2, "#pending circuit").unwrap();
    job.submit().unwrap();

    // The pending job is RUNNING; a zero-timeout wait polls once and
    // reports the timeout instead of blocking forever.
    let err = job.wait(Duration::ZERO).unwrap_err();
    assert!(matches!(err, QdapError::Timeout));

    job.cancel().unwrap();
}

#[test]
fn wait_on_completed_job_returns_immediately() {
    let _g = guard();
    let device = open_initialized();
    let session = Session::open(&device).unwrap();

    let job = session.create_job().unwrap();
    job.set_program(ProgramFormat::Qasm2, BELL_QASM).unwrap();
    job.submit().unwrap();
    assert_eq!(job.check().unwrap(), JobStatus::Done);

    // Already terminal: no boundary wait happens and no timeout can occur.
    assert_eq!(job.wait(Duration::ZERO).unwrap(), JobStatus::Done);
    assert_eq!(job.wait(Duration::from_secs(3600)).unwrap(), JobStatus::Done);
}

#[test]
fn cancel_running_job() {
    let _g = guard();
    let device = open_initialized();
    let session = Session::open(&device).unwrap();

    let job = session.create_job().unwrap();
    job.set_program(ProgramFormat::Qasm3, "#pending circuit").unwrap();
    job.submit().unwrap();
    assert_eq!(job.check().unwrap(), JobStatus::Running);

    assert_eq!(job.cancel().unwrap(), JobStatus::Cancelled);

    // Results never become available for a cancelled job.
    let err = job.histogram().unwrap_err();
    assert!(matches!(err, QdapError::BadState(_)));
}

#[test]
fn cancel_never_resurrects_a_done_job() {
    let _g = guard();
    let device = open_initialized();
    let session = Session::open(&device).unwrap();

    let job = session.create_job().unwrap();
    job.set_program(ProgramFormat::Qasm2, BELL_QASM).unwrap();
    job.submit().unwrap();
    assert_eq!(job.check().unwrap(), JobStatus::Done);

    assert_eq!(job.cancel().unwrap(), JobStatus::Done);
    // Results remain readable after the no-op cancel.
    assert!(job.histogram().is_ok());
}

#[test]
fn unsupported_result_channel() {
    let _g = guard();
    let device = open_initialized();
    let session = Session::open(&device).unwrap();

    let job = session.create_job().unwrap();
    job.set_program(ProgramFormat::Qasm2, BELL_QASM).unwrap();
    job.submit().unwrap();
    job.check().unwrap();

    let err = job.results(ffi::QDAP_JOB_RESULT_SHOTS).unwrap_err();
    assert!(matches!(err, QdapError::NotSupported));
}

#[test]
fn repeated_job_cycles() {
    let _g = guard();
    let device = open_initialized();
    let session = Session::open(&device).unwrap();

    for i in 0..3 {
        let job = session.create_job().unwrap();
        job.set_program(ProgramFormat::Qasm2, BELL_QASM).unwrap();
        job.set_shots(100 + i).unwrap();
        job.submit().unwrap();
        assert_eq!(job.check().unwrap(), JobStatus::Done);
        let total: u64 = job.histogram().unwrap().iter().map(|(_, n)| n).sum();
        assert_eq!(total, 100 + i);
        // job drops here (job_free called)
    }
}

// ---------------------------------------------------------------------------
// Registry
// ---------------------------------------------------------------------------

#[test]
fn registry_rejects_duplicate_prefix() {
    let _g = guard();
    let registry = DeviceRegistry::new();
    let path = Path::new(mock_device_path());

    let device = registry.load(path, "MOCK").unwrap();
    assert_eq!(device.prefix(), "MOCK");
    assert_eq!(registry.len(), 1);

    let err = registry.load(path, "MOCK").unwrap_err();
    assert!(matches!(err, QdapError::InvalidArgument(_)));

    assert!(registry.get("MOCK").is_some());
    assert!(registry.remove("MOCK").is_some());
    assert!(registry.is_empty());
}

#[test]
fn registry_scan_directory() {
    let _g = guard();
    let dir = tempfile::tempdir().expect("tempdir");

    // One loadable backend copy, one unrelated file, one shared object with
    // no prefix mapping.
    std::fs::copy(mock_device_path(), dir.path().join("libscan_target.so")).unwrap();
    std::fs::write(dir.path().join("README.txt"), "not a library").unwrap();
    std::fs::copy(mock_device_path(), dir.path().join("libunmapped.so")).unwrap();

    let mut prefix_map = std::collections::HashMap::new();
    prefix_map.insert("scan_target".to_string(), "MOCK".to_string());

    let registry = DeviceRegistry::new();
    let discovered = registry.scan_directory(dir.path(), &prefix_map).unwrap();
    assert_eq!(discovered, 1);
    assert_eq!(registry.prefixes(), vec!["MOCK".to_string()]);
}
