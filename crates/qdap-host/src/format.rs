// SPDX-License-Identifier: Apache-2.0
//! Program format types and negotiation.

use crate::ffi;

/// Program serialization formats a QDAP backend may accept.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ProgramFormat {
    /// OpenQASM 2.0 source text.
    Qasm2,
    /// OpenQASM 3.0 source text.
    Qasm3,
    /// QIR in textual form.
    QirText,
}

impl ProgramFormat {
    /// Preference rank (lower = more preferred by the host).
    pub(crate) fn preference_rank(self) -> u32 {
        match self {
            ProgramFormat::Qasm3 => 0,
            ProgramFormat::QirText => 1,
            ProgramFormat::Qasm2 => 2,
        }
    }

    /// Convert a wire format code to a `ProgramFormat`.
    ///
    /// Returns `None` for codes this host does not understand; unknown
    /// formats advertised by a backend are skipped, not fatal.
    pub fn from_raw(fmt: ffi::RawProgramFormat) -> Option<Self> {
        match fmt {
            ffi::QDAP_PROGRAM_FORMAT_QASM2 => Some(ProgramFormat::Qasm2),
            ffi::QDAP_PROGRAM_FORMAT_QASM3 => Some(ProgramFormat::Qasm3),
            ffi::QDAP_PROGRAM_FORMAT_QIRSTRING => Some(ProgramFormat::QirText),
            _ => None,
        }
    }

    /// The wire format code for job submission.
    pub fn as_raw(self) -> ffi::RawProgramFormat {
        match self {
            ProgramFormat::Qasm2 => ffi::QDAP_PROGRAM_FORMAT_QASM2,
            ProgramFormat::Qasm3 => ffi::QDAP_PROGRAM_FORMAT_QASM3,
            ProgramFormat::QirText => ffi::QDAP_PROGRAM_FORMAT_QIRSTRING,
        }
    }
}

impl std::fmt::Display for ProgramFormat {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            ProgramFormat::Qasm2 => "openqasm2",
            ProgramFormat::Qasm3 => "openqasm3",
            ProgramFormat::QirText => "qir",
        };
        f.write_str(s)
    }
}

/// Pick the best format from the set a backend supports, optionally
/// honouring a caller preference.
pub fn negotiate_format(
    supported: &[ProgramFormat],
    preferred: Option<ProgramFormat>,
) -> Option<ProgramFormat> {
    if let Some(pref) = preferred {
        if supported.contains(&pref) {
            return Some(pref);
        }
    }
    supported.iter().copied().min_by_key(|f| f.preference_rank())
}
