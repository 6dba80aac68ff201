//! Messages exchanged by the protocols.

use lryao_core::{
    commit::{Commitment, Decommitment},
    garble::{GarbledTables, TranslationTable},
    matrix::ProbeResistantMatrix,
    selection::CutAndChooseSelection,
    Block,
};
use serde::{Deserialize, Serialize};

/// A garbled circuit, streamed by P1 during garbling.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GarbledCircuitMessage {
    /// Encrypted gates.
    pub tables: GarbledTables,
    /// Translation table.
    pub translation_table: TranslationTable,
}

/// P2's commitments to its cut-and-choose challenge.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CutAndChooseCommitments {
    /// Commitment to the selection.
    pub selection: Commitment,
    /// Commitment to the bucket mapping seed.
    pub mapping: Commitment,
}

/// P2's challenge, opening [`CutAndChooseCommitments`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Reveal {
    /// Opens the selection.
    pub selection: Decommitment<CutAndChooseSelection>,
    /// Opens the bucket mapping seed.
    pub mapping: Decommitment<Block>,
    /// Opens the key encrypting the selection in the difference protocol.
    pub k: Decommitment<Block>,
}

/// The probe-resistant matrices chosen by P2.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Matrices {
    /// Matrix of the main circuit.
    pub main: ProbeResistantMatrix,
    /// Matrix of the cheating-recovery circuit.
    pub cheating_recovery: ProbeResistantMatrix,
}
