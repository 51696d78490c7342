// SPDX-License-Identifier: Apache-2.0
//! Structured device capability model.
//!
//! Queries a session for every device, site and operation property and
//! assembles the results into a [`DeviceCapabilities`] value that callers
//! can consume for topology-aware routing and noise-aware scheduling.
//! Properties a backend does not support are recorded as absent, never as
//! failures; only genuinely broken responses propagate.
//!
//! Site and operation handles are backend-defined opaque tokens. The host
//! never dereferences them — it round-trips them verbatim into query calls
//! — and wraps them in distinct newtypes so the type system prevents
//! passing one kind where the other is expected.

use std::collections::{HashMap, VecDeque};
use std::time::Duration;

use crate::error::{QdapError, Result};
use crate::ffi;
use crate::format::ProgramFormat;
use crate::session::Session;

// ---------------------------------------------------------------------------
// Opaque tokens
// ---------------------------------------------------------------------------

/// Opaque token addressing one site (qubit-like resource) on a device.
///
/// The raw pointer value is stored as a `usize` so tokens are `Copy`,
/// `Hash`, etc. A token is only meaningful within the session that
/// reported it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SiteToken(pub usize);

impl SiteToken {
    pub(crate) fn as_raw(self) -> ffi::RawSite {
        self.0 as ffi::RawSite
    }
}

/// Opaque token addressing one supported operation (gate) on a device.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct OperationToken(pub usize);

impl OperationToken {
    pub(crate) fn as_raw(self) -> ffi::RawOperation {
        self.0 as ffi::RawOperation
    }
}

// ---------------------------------------------------------------------------
// Device status
// ---------------------------------------------------------------------------

/// Operational status reported by a device.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeviceStatus {
    Offline,
    Idle,
    Busy,
    Error,
    Maintenance,
    Calibration,
}

impl DeviceStatus {
    pub fn from_raw(raw: ffi::RawDeviceStatus) -> Option<Self> {
        match raw {
            ffi::QDAP_DEVICE_STATUS_OFFLINE => Some(DeviceStatus::Offline),
            ffi::QDAP_DEVICE_STATUS_IDLE => Some(DeviceStatus::Idle),
            ffi::QDAP_DEVICE_STATUS_BUSY => Some(DeviceStatus::Busy),
            ffi::QDAP_DEVICE_STATUS_ERROR => Some(DeviceStatus::Error),
            ffi::QDAP_DEVICE_STATUS_MAINTENANCE => Some(DeviceStatus::Maintenance),
            ffi::QDAP_DEVICE_STATUS_CALIBRATION => Some(DeviceStatus::Calibration),
            _ => None,
        }
    }
}

// ---------------------------------------------------------------------------
// Capability records
// ---------------------------------------------------------------------------

/// Complete device capabilities extracted through the query interface.
#[derive(Debug, Clone)]
pub struct DeviceCapabilities {
    /// Human-readable device name.
    pub name: String,

    /// Device firmware/model version, if reported.
    pub version: Option<String>,

    /// Version of the backend plugin library, if reported.
    pub library_version: Option<String>,

    /// Operational status, if reported.
    pub status: Option<DeviceStatus>,

    /// Total number of qubits.
    pub num_qubits: usize,

    /// Ordered list of site tokens.
    pub sites: Vec<SiteToken>,

    /// Qubit connectivity graph, built host-side from reported edge pairs.
    pub coupling_map: CouplingMap,

    /// Available operation tokens.
    pub operations: Vec<OperationToken>,

    /// Per-site physical properties.
    pub site_properties: HashMap<SiteToken, SiteProperties>,

    /// Per-operation properties.
    pub operation_properties: HashMap<OperationToken, OperationProperties>,

    /// Unit label for raw duration ticks (e.g. "ns"), if reported.
    pub duration_unit: Option<String>,

    /// Factor converting raw duration ticks to seconds.
    pub duration_scale_factor: f64,

    /// Program formats the device accepts.
    pub supported_formats: Vec<ProgramFormat>,
}

/// Per-site properties. Durations are converted to seconds using the
/// device's duration scale factor.
#[derive(Debug, Clone, Default)]
pub struct SiteProperties {
    /// Position of the site in the device's canonical ordering.
    pub index: Option<usize>,
    /// T₁ relaxation time.
    pub t1: Option<Duration>,
    /// T₂ dephasing time.
    pub t2: Option<Duration>,
    /// Backend-assigned site name.
    pub name: Option<String>,
}

/// Per-operation properties.
#[derive(Debug, Clone, Default)]
pub struct OperationProperties {
    /// Gate name (e.g. "cx", "rz", "h").
    pub name: Option<String>,
    /// Number of sites this operation acts on.
    pub num_qubits: Option<usize>,
    /// Number of classical parameters (e.g. rotation angles).
    pub num_parameters: Option<usize>,
    /// Execution time.
    pub duration: Option<Duration>,
    /// Fidelity (0.0 – 1.0).
    pub fidelity: Option<f64>,
}

// ---------------------------------------------------------------------------
// Coupling map
// ---------------------------------------------------------------------------

/// Sparse directed graph of site connectivity.
///
/// Built from the flat pair sequence the device reports. Every token that
/// appears in an edge is interned into a dense index space at construction,
/// so traversals work on vector indices instead of hashing opaque tokens at
/// each hop. Sites with no edges at all never enter the map.
#[derive(Debug, Clone, Default)]
pub struct CouplingMap {
    edges: Vec<(SiteToken, SiteToken)>,
    /// Interned tokens; position is the node index.
    nodes: Vec<SiteToken>,
    node_index: HashMap<SiteToken, usize>,
    /// Outgoing neighbours per node index.
    adjacency: Vec<Vec<SiteToken>>,
}

impl CouplingMap {
    /// Build from directed edge pairs `[(a0,b0), (a1,b1), ...]`.
    pub fn from_pairs(pairs: Vec<(SiteToken, SiteToken)>) -> Self {
        let mut map = Self {
            edges: pairs,
            nodes: Vec::new(),
            node_index: HashMap::new(),
            adjacency: Vec::new(),
        };
        for i in 0..map.edges.len() {
            let (a, b) = map.edges[i];
            let from = map.intern(a);
            map.intern(b);
            map.adjacency[from].push(b);
        }
        map
    }

    fn intern(&mut self, token: SiteToken) -> usize {
        if let Some(&idx) = self.node_index.get(&token) {
            return idx;
        }
        let idx = self.nodes.len();
        self.nodes.push(token);
        self.adjacency.push(Vec::new());
        self.node_index.insert(token, idx);
        idx
    }

    /// All directed edges.
    pub fn edges(&self) -> &[(SiteToken, SiteToken)] {
        &self.edges
    }

    /// Number of directed edges.
    pub fn num_edges(&self) -> usize {
        self.edges.len()
    }

    /// Whether a directed edge `a → b` exists.
    pub fn is_connected(&self, a: SiteToken, b: SiteToken) -> bool {
        self.neighbors(a).contains(&b)
    }

    /// Neighbours reachable from `site` in one hop.
    pub fn neighbors(&self, site: SiteToken) -> &[SiteToken] {
        match self.node_index.get(&site) {
            Some(&idx) => &self.adjacency[idx],
            None => &[],
        }
    }

    /// Shortest-path distances from one node to every node, by index.
    /// `None` entries are unreachable.
    fn hops_from(&self, start: usize) -> Vec<Option<usize>> {
        let mut hops = vec![None; self.nodes.len()];
        hops[start] = Some(0);

        let mut frontier = VecDeque::from([(start, 0usize)]);
        while let Some((idx, d)) = frontier.pop_front() {
            for nbr in &self.adjacency[idx] {
                let ni = self.node_index[nbr];
                if hops[ni].is_none() {
                    hops[ni] = Some(d + 1);
                    frontier.push_back((ni, d + 1));
                }
            }
        }
        hops
    }

    /// BFS shortest-path distance from `from` to `to`. `None` if unreachable.
    pub fn distance(&self, from: SiteToken, to: SiteToken) -> Option<usize> {
        if from == to {
            return Some(0);
        }
        let start = *self.node_index.get(&from)?;
        let goal = *self.node_index.get(&to)?;
        self.hops_from(start)[goal]
    }

    /// Maximum shortest-path distance over all pairs of sites that have a
    /// path between them. `None` for an empty map.
    pub fn diameter(&self) -> Option<usize> {
        let mut max_d: Option<usize> = None;
        for start in 0..self.nodes.len() {
            for d in self.hops_from(start).into_iter().flatten() {
                max_d = Some(max_d.map_or(d, |m| m.max(d)));
            }
        }
        max_d
    }
}

// ---------------------------------------------------------------------------
// Capability query orchestrator
// ---------------------------------------------------------------------------

impl DeviceCapabilities {
    /// Query all available capabilities from an active session.
    ///
    /// Unsupported properties become `None`/empty; only fatal or malformed
    /// responses propagate as errors.
    pub fn query(session: &Session<'_>) -> Result<Self> {
        // -- Device-level properties -----------------------------------------

        let name = session
            .query_device_string(ffi::QDAP_DEVICE_PROPERTY_NAME)
            .unwrap_or_else(|_| "<unnamed>".into());

        let version = session
            .query_device_string(ffi::QDAP_DEVICE_PROPERTY_VERSION)
            .ok();

        let library_version = session
            .query_device_string(ffi::QDAP_DEVICE_PROPERTY_LIBRARYVERSION)
            .ok();

        let status = session
            .query_device_i32(ffi::QDAP_DEVICE_PROPERTY_STATUS)
            .ok()
            .and_then(DeviceStatus::from_raw);

        let num_qubits = session
            .query_device_usize(ffi::QDAP_DEVICE_PROPERTY_QUBITSNUM)
            .unwrap_or(0);

        let duration_unit = session
            .query_device_string(ffi::QDAP_DEVICE_PROPERTY_DURATIONUNIT)
            .ok();

        let duration_scale_factor = match session
            .query_device_f64(ffi::QDAP_DEVICE_PROPERTY_DURATIONSCALEFACTOR)
        {
            Ok(sf) => sf,
            Err(QdapError::NotSupported) => 1.0,
            Err(e) => return Err(e),
        };

        // -- Sites, coupling map, operations ---------------------------------

        let sites = query_sites(session)?;
        let coupling_map = query_coupling_map(session)?;
        let operations = query_operations(session)?;

        // -- Per-site properties ---------------------------------------------

        let mut site_properties = HashMap::new();
        for &site in &sites {
            let props = query_site_properties(session, site, duration_scale_factor)?;
            site_properties.insert(site, props);
        }

        // -- Per-operation properties ----------------------------------------

        let mut operation_properties = HashMap::new();
        for &op in &operations {
            let props = query_operation_properties(session, op, duration_scale_factor)?;
            operation_properties.insert(op, props);
        }

        // -- Supported formats -----------------------------------------------

        let supported_formats = query_supported_formats(session)?;

        Ok(Self {
            name,
            version,
            library_version,
            status,
            num_qubits,
            sites,
            coupling_map,
            operations,
            site_properties,
            operation_properties,
            duration_unit,
            duration_scale_factor,
            supported_formats,
        })
    }
}

// ---------------------------------------------------------------------------
// Internal query helpers
// ---------------------------------------------------------------------------

fn ticks_to_duration(ticks: u64, scale: f64) -> Duration {
    Duration::from_secs_f64(ticks as f64 * scale)
}

/// Retrieve the list of site tokens from the device.
fn query_sites(session: &Session<'_>) -> Result<Vec<SiteToken>> {
    let buf = match session.raw_query_device_property(ffi::QDAP_DEVICE_PROPERTY_SITES) {
        Ok(b) => b,
        Err(QdapError::NotSupported) => return Ok(Vec::new()),
        Err(e) => return Err(e),
    };
    let tokens = crate::codec::decode_tokens(&buf, "query_device_property")?;
    tracing::debug!("queried {} sites from device", tokens.len());
    Ok(tokens.into_iter().map(SiteToken).collect())
}

/// Parse the coupling map: a flat sequence of site-token pairs, each pair a
/// directed edge.
fn query_coupling_map(session: &Session<'_>) -> Result<CouplingMap> {
    let buf = match session.raw_query_device_property(ffi::QDAP_DEVICE_PROPERTY_COUPLINGMAP) {
        Ok(b) => b,
        Err(QdapError::NotSupported) => {
            tracing::warn!("device does not report a coupling map");
            return Ok(CouplingMap::default());
        }
        Err(e) => return Err(e),
    };
    let pairs = crate::codec::decode_token_pairs(&buf, "query_device_property")?;
    tracing::debug!("queried coupling map with {} edges", pairs.len());
    Ok(CouplingMap::from_pairs(
        pairs
            .into_iter()
            .map(|(a, b)| (SiteToken(a), SiteToken(b)))
            .collect(),
    ))
}

/// Retrieve the list of operation tokens.
fn query_operations(session: &Session<'_>) -> Result<Vec<OperationToken>> {
    let buf = match session.raw_query_device_property(ffi::QDAP_DEVICE_PROPERTY_OPERATIONS) {
        Ok(b) => b,
        Err(QdapError::NotSupported) => return Ok(Vec::new()),
        Err(e) => return Err(e),
    };
    let tokens = crate::codec::decode_tokens(&buf, "query_device_property")?;
    tracing::debug!("queried {} operations from device", tokens.len());
    Ok(tokens.into_iter().map(OperationToken).collect())
}

fn query_site_properties(
    session: &Session<'_>,
    site: SiteToken,
    scale: f64,
) -> Result<SiteProperties> {
    let index = session.query_site_usize_optional(site, ffi::QDAP_SITE_PROPERTY_INDEX)?;

    let t1 = session
        .query_site_u64_optional(site, ffi::QDAP_SITE_PROPERTY_T1)?
        .map(|ticks| ticks_to_duration(ticks, scale));

    let t2 = session
        .query_site_u64_optional(site, ffi::QDAP_SITE_PROPERTY_T2)?
        .map(|ticks| ticks_to_duration(ticks, scale));

    let name = session.query_site_string_optional(site, ffi::QDAP_SITE_PROPERTY_NAME)?;

    Ok(SiteProperties {
        index,
        t1,
        t2,
        name,
    })
}

fn query_operation_properties(
    session: &Session<'_>,
    op: OperationToken,
    scale: f64,
) -> Result<OperationProperties> {
    let name = session.query_operation_string_optional(op, ffi::QDAP_OPERATION_PROPERTY_NAME)?;

    let num_qubits =
        session.query_operation_usize_optional(op, ffi::QDAP_OPERATION_PROPERTY_QUBITSNUM)?;

    let num_parameters =
        session.query_operation_usize_optional(op, ffi::QDAP_OPERATION_PROPERTY_PARAMETERSNUM)?;

    let duration = session
        .query_operation_u64_optional(op, ffi::QDAP_OPERATION_PROPERTY_DURATION)?
        .map(|ticks| ticks_to_duration(ticks, scale));

    let fidelity =
        session.query_operation_f64_optional(op, ffi::QDAP_OPERATION_PROPERTY_FIDELITY)?;

    Ok(OperationProperties {
        name,
        num_qubits,
        num_parameters,
        duration,
        fidelity,
    })
}

/// Query the supported-program-format list (an array of wire codes).
fn query_supported_formats(session: &Session<'_>) -> Result<Vec<ProgramFormat>> {
    let buf = match session
        .raw_query_device_property(ffi::QDAP_DEVICE_PROPERTY_SUPPORTEDPROGRAMFORMATS)
    {
        Ok(b) => b,
        Err(QdapError::NotSupported) => {
            tracing::warn!("device does not advertise program formats");
            return Ok(Vec::new());
        }
        Err(e) => return Err(e),
    };
    let codes = crate::codec::decode_i32_array(&buf, "query_device_property")?;
    Ok(codes.into_iter().filter_map(ProgramFormat::from_raw).collect())
}

// ---------------------------------------------------------------------------
// Unit tests for CouplingMap
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    fn linear_5q() -> CouplingMap {
        // 0 ↔ 1 ↔ 2 ↔ 3 ↔ 4
        let mut pairs = Vec::new();
        for i in 0..4usize {
            pairs.push((SiteToken(i), SiteToken(i + 1)));
            pairs.push((SiteToken(i + 1), SiteToken(i)));
        }
        CouplingMap::from_pairs(pairs)
    }

    #[test]
    fn linear_chain_edge_count() {
        assert_eq!(linear_5q().num_edges(), 8);
    }

    #[test]
    fn connectivity() {
        let cm = linear_5q();
        assert!(cm.is_connected(SiteToken(0), SiteToken(1)));
        assert!(cm.is_connected(SiteToken(1), SiteToken(0)));
        assert!(!cm.is_connected(SiteToken(0), SiteToken(2)));
    }

    #[test]
    fn neighbors_of_interior_site() {
        let cm = linear_5q();
        let n = cm.neighbors(SiteToken(2));
        assert_eq!(n.len(), 2);
        assert!(n.contains(&SiteToken(1)));
        assert!(n.contains(&SiteToken(3)));
    }

    #[test]
    fn bfs_distance() {
        let cm = linear_5q();
        assert_eq!(cm.distance(SiteToken(0), SiteToken(0)), Some(0));
        assert_eq!(cm.distance(SiteToken(0), SiteToken(1)), Some(1));
        assert_eq!(cm.distance(SiteToken(0), SiteToken(4)), Some(4));
    }

    #[test]
    fn distance_respects_edge_direction() {
        let cm = CouplingMap::from_pairs(vec![(SiteToken(0), SiteToken(1))]);
        assert_eq!(cm.distance(SiteToken(0), SiteToken(1)), Some(1));
        assert_eq!(cm.distance(SiteToken(1), SiteToken(0)), None);
    }

    #[test]
    fn diameter_of_line() {
        assert_eq!(linear_5q().diameter(), Some(4));
    }

    #[test]
    fn diameter_spans_only_reachable_pairs() {
        // One-way edge: the only finite non-trivial distance is 0 → 1.
        let cm = CouplingMap::from_pairs(vec![(SiteToken(0), SiteToken(1))]);
        assert_eq!(cm.diameter(), Some(1));
        assert_eq!(CouplingMap::default().diameter(), None);
    }

    #[test]
    fn empty_coupling_map() {
        let cm = CouplingMap::default();
        assert_eq!(cm.num_edges(), 0);
        assert!(cm.neighbors(SiteToken(0)).is_empty());
    }

    #[test]
    fn tokens_are_distinct_types() {
        // Compile-time property: a SiteToken cannot be used as an
        // OperationToken. Constructing both from the same raw value is fine.
        let s = SiteToken(0x1000);
        let o = OperationToken(0x1000);
        assert_eq!(s.0, o.0);
    }

    #[test]
    fn ticks_scale_to_seconds() {
        let d = ticks_to_duration(30, 1e-9);
        assert!((d.as_secs_f64() - 30e-9).abs() < 1e-15);
    }
}
