//! Simulated on-chain registry of emission records.
//!
//! There is no chain behind this: records are seeded from fixtures, and block
//! numbers and verification outcomes are drawn from an [`Entropy`] source.

use crate::errors::ApiError;
use serde::Serialize;
use uuid::Uuid;

pub const BLOCK_RANGE_START: u64 = 17_000_000;
pub const BLOCK_RANGE_LEN: u64 = 10_000_000;
/// Percent of hash lookups that come back verified.
pub const VERIFY_SUCCESS_PERCENT: u64 = 70;
pub const TRANSFER_GAS: u64 = 21_000;

/// Source of the mock randomness.
pub trait Entropy: Send + Sync {
    fn next_u64(&self) -> u64;

    fn block_number(&self) -> u64 {
        BLOCK_RANGE_START + self.next_u64() % BLOCK_RANGE_LEN
    }

    fn chance(&self, percent: u64) -> bool {
        self.next_u64() % 100 < percent
    }

    /// `len` lowercase hex digits.
    fn hex(&self, len: usize) -> String {
        let mut out = String::with_capacity(len + 16);
        while out.len() < len {
            out.push_str(&format!("{:016x}", self.next_u64()));
        }
        out.truncate(len);
        out
    }
}

/// Draws from random (v4) UUIDs.
#[derive(Debug, Clone, Copy, Default)]
pub struct UuidEntropy;

impl Entropy for UuidEntropy {
    fn next_u64(&self) -> u64 {
        let value = Uuid::new_v4().as_u128();
        (value >> 64) as u64 ^ value as u64
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum RecordKind {
    Energy,
    Fleet,
    Compensation,
}

impl RecordKind {
    pub fn label(self) -> &'static str {
        match self {
            Self::Energy => "Energia",
            Self::Fleet => "Frota",
            Self::Compensation => "Compensação",
        }
    }

    fn as_str(self) -> &'static str {
        match self {
            Self::Energy => "energy",
            Self::Fleet => "fleet",
            Self::Compensation => "compensation",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum RecordStatus {
    Confirmed,
    Pending,
}

impl RecordStatus {
    pub fn label(self) -> &'static str {
        match self {
            Self::Confirmed => "Confirmado",
            Self::Pending => "Pendente",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RegistryRecord {
    pub hash: String,
    pub date: String,
    #[serde(rename = "type")]
    pub kind: RecordKind,
    pub description: String,
    /// Negative for compensations.
    pub emissions: f64,
    pub status: RecordStatus,
    pub block: Option<u64>,
    pub gas_used: Option<u64>,
    pub timestamp: String,
}

impl RegistryRecord {
    pub fn short_hash(&self) -> String {
        if self.hash.len() <= 18 {
            return self.hash.clone();
        }
        format!("{}...{}", &self.hash[..10], &self.hash[self.hash.len() - 8..])
    }

    fn confirm(&mut self, entropy: &dyn Entropy) {
        self.status = RecordStatus::Confirmed;
        self.block = Some(entropy.block_number());
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RegistrySummary {
    pub total: usize,
    pub confirmed: usize,
    pub pending: usize,
    pub total_emissions: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "outcome", rename_all = "camelCase")]
pub enum HashVerification {
    #[serde(rename_all = "camelCase")]
    Verified { hash: String, block: u64, gas_used: u64 },
    NotFound { hash: String },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Network {
    Ethereum,
    Polygon,
    Bsc,
    Hyperledger,
}

impl Network {
    pub fn parse(raw: &str) -> Self {
        match raw.trim().to_lowercase().as_str() {
            "polygon" => Self::Polygon,
            "bsc" => Self::Bsc,
            "hyperledger" => Self::Hyperledger,
            _ => Self::Ethereum,
        }
    }

    pub fn display_name(self) -> &'static str {
        match self {
            Self::Ethereum => "Ethereum Mainnet",
            Self::Polygon => "Polygon",
            Self::Bsc => "Binance Smart Chain",
            Self::Hyperledger => "Hyperledger",
        }
    }

    /// Hyperledger has no public explorer.
    pub fn explorer_url(self, hash: &str) -> Option<String> {
        match self {
            Self::Ethereum => Some(format!("https://etherscan.io/tx/{hash}")),
            Self::Polygon => Some(format!("https://polygonscan.com/tx/{hash}")),
            Self::Bsc => Some(format!("https://bscscan.com/tx/{hash}")),
            Self::Hyperledger => None,
        }
    }
}

pub fn verify_hash(hash: &str, entropy: &dyn Entropy) -> Result<HashVerification, ApiError> {
    let hash = hash.trim();
    if hash.is_empty() {
        return Err(ApiError::validation("Digite um hash de transação."));
    }
    Ok(if entropy.chance(VERIFY_SUCCESS_PERCENT) {
        HashVerification::Verified {
            hash: hash.to_string(),
            block: entropy.block_number(),
            gas_used: TRANSFER_GAS,
        }
    } else {
        HashVerification::NotFound { hash: hash.to_string() }
    })
}

#[derive(Debug, Clone, Default)]
pub struct Registry {
    records: Vec<RegistryRecord>,
}

impl Registry {
    pub fn new(records: Vec<RegistryRecord>) -> Self {
        Self { records }
    }

    pub fn with_fixtures() -> Self {
        Self::new(fixtures())
    }

    pub fn records(&self) -> &[RegistryRecord] {
        &self.records
    }

    pub fn find(&self, hash: &str) -> Option<&RegistryRecord> {
        self.records.iter().find(|record| record.hash == hash)
    }

    pub fn summary(&self) -> RegistrySummary {
        RegistrySummary {
            total: self.records.len(),
            confirmed: self.count(RecordStatus::Confirmed),
            pending: self.count(RecordStatus::Pending),
            total_emissions: self.records.iter().map(|record| record.emissions).sum(),
        }
    }

    fn count(&self, status: RecordStatus) -> usize {
        self.records.iter().filter(|record| record.status == status).count()
    }

    /// Confirms one record with a fresh block number. Already confirmed records
    /// are re-confirmed.
    pub fn verify(&mut self, hash: &str, entropy: &dyn Entropy) -> Result<&RegistryRecord, ApiError> {
        let record = self
            .records
            .iter_mut()
            .find(|record| record.hash == hash)
            .ok_or_else(|| ApiError::validation("Transação não encontrada."))?;
        record.confirm(entropy);
        Ok(record)
    }

    /// Confirms every pending record; returns how many changed.
    pub fn verify_all(&mut self, entropy: &dyn Entropy) -> usize {
        let mut confirmed = 0;
        for record in self
            .records
            .iter_mut()
            .filter(|record| record.status == RecordStatus::Pending)
        {
            record.confirm(entropy);
            confirmed += 1;
        }
        confirmed
    }

    /// Hash, date and type match as typed; description ignores case.
    pub fn search(&self, query: &str) -> Result<Vec<&RegistryRecord>, ApiError> {
        let query = query.trim();
        if query.is_empty() {
            return Err(ApiError::validation("Digite um termo para buscar."));
        }
        let lowered = query.to_lowercase();
        Ok(self
            .records
            .iter()
            .filter(|record| {
                record.hash.contains(query)
                    || record.date.contains(query)
                    || record.kind.as_str().contains(query)
                    || record.description.to_lowercase().contains(&lowered)
            })
            .collect())
    }
}

pub fn fixtures() -> Vec<RegistryRecord> {
    let record = |hash: &str,
                  date: &str,
                  kind,
                  description: &str,
                  emissions,
                  status,
                  block,
                  gas_used,
                  timestamp: &str| RegistryRecord {
        hash: hash.to_string(),
        date: date.to_string(),
        kind,
        description: description.to_string(),
        emissions,
        status,
        block,
        gas_used,
        timestamp: timestamp.to_string(),
    };

    vec![
        record(
            "0x1a2b3c4d5e6f7890abcdef1234567890",
            "2023-06-15",
            RecordKind::Energy,
            "Emissões de energia - Junho",
            1250.0,
            RecordStatus::Confirmed,
            Some(17_543_210),
            Some(21_000),
            "2023-06-15T14:30:00Z",
        ),
        record(
            "0x2b3c4d5e6f7890abcdef12345678901",
            "2023-05-15",
            RecordKind::Energy,
            "Emissões de energia - Maio",
            1150.0,
            RecordStatus::Confirmed,
            Some(17_432_109),
            Some(21_000),
            "2023-05-15T13:25:00Z",
        ),
        record(
            "0x3c4d5e6f7890abcdef123456789012",
            "2023-06-10",
            RecordKind::Fleet,
            "Emissões da frota - Junho",
            2180.0,
            RecordStatus::Pending,
            None,
            None,
            "2023-06-10T09:15:00Z",
        ),
        record(
            "0x4d5e6f7890abcdef1234567890123",
            "2023-04-20",
            RecordKind::Compensation,
            "Compensação via reflorestamento",
            -850.0,
            RecordStatus::Confirmed,
            Some(17_321_098),
            Some(45_000),
            "2023-04-20T16:45:00Z",
        ),
    ]
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU64, Ordering};

    /// Deterministic entropy: yields the given values in a cycle.
    pub(crate) struct SequenceEntropy {
        values: Vec<u64>,
        cursor: AtomicU64,
    }

    impl SequenceEntropy {
        pub(crate) fn new(values: Vec<u64>) -> Self {
            Self {
                values,
                cursor: AtomicU64::new(0),
            }
        }
    }

    impl Entropy for SequenceEntropy {
        fn next_u64(&self) -> u64 {
            let index = self.cursor.fetch_add(1, Ordering::Relaxed) as usize;
            self.values[index % self.values.len()]
        }
    }

    #[test]
    fn fixture_counts() {
        let registry = Registry::with_fixtures();
        let summary = registry.summary();
        assert_eq!(summary.total, 4);
        assert_eq!(summary.confirmed, 3);
        assert_eq!(summary.pending, 1);
        assert_eq!(summary.total_emissions, 3730.0);
    }

    #[test]
    fn verify_assigns_block_in_range() {
        let mut registry = Registry::with_fixtures();
        let entropy = SequenceEntropy::new(vec![123]);
        let record = registry.verify("0x3c4d5e6f7890abcdef123456789012", &entropy).unwrap();
        assert_eq!(record.status, RecordStatus::Confirmed);
        assert_eq!(record.block, Some(17_000_123));
        assert!(registry.verify("0xdead", &entropy).is_err());
    }

    #[test]
    fn verify_all_touches_only_pending() {
        let mut registry = Registry::with_fixtures();
        let entropy = SequenceEntropy::new(vec![u64::MAX]);
        assert_eq!(registry.verify_all(&entropy), 1);
        assert_eq!(registry.summary().pending, 0);
        let block = registry.find("0x3c4d5e6f7890abcdef123456789012").unwrap().block.unwrap();
        assert!((BLOCK_RANGE_START..BLOCK_RANGE_START + BLOCK_RANGE_LEN).contains(&block));
        assert_eq!(registry.find("0x1a2b3c4d5e6f7890abcdef1234567890").unwrap().block, Some(17_543_210));
        assert_eq!(registry.verify_all(&entropy), 0);
    }

    #[test]
    fn hash_verification_outcomes() {
        let lucky = SequenceEntropy::new(vec![69, 5]);
        assert_eq!(
            verify_hash(" 0xabc ", &lucky).unwrap(),
            HashVerification::Verified {
                hash: "0xabc".into(),
                block: 17_000_005,
                gas_used: TRANSFER_GAS
            }
        );
        let unlucky = SequenceEntropy::new(vec![70]);
        assert!(matches!(verify_hash("0xabc", &unlucky).unwrap(), HashVerification::NotFound { .. }));
        assert_eq!(
            verify_hash("", &unlucky).unwrap_err().to_string(),
            "Digite um hash de transação."
        );
    }

    #[test]
    fn explorer_links() {
        assert_eq!(
            Network::parse("polygon").explorer_url("0x1").as_deref(),
            Some("https://polygonscan.com/tx/0x1")
        );
        assert_eq!(Network::parse("").explorer_url("0x1").as_deref(), Some("https://etherscan.io/tx/0x1"));
        assert_eq!(Network::parse("bsc").display_name(), "Binance Smart Chain");
        assert_eq!(Network::Hyperledger.explorer_url("0x1"), None);
    }

    #[test]
    fn search_by_hash_type_or_description() {
        let registry = Registry::with_fixtures();
        assert_eq!(registry.search("fleet").unwrap().len(), 1);
        assert_eq!(registry.search("JUNHO").unwrap().len(), 2);
        assert_eq!(registry.search("0x4d5e").unwrap().len(), 1);
        assert_eq!(registry.search("2023-05").unwrap().len(), 1);
        assert!(registry.search(" ").is_err());
    }

    #[test]
    fn hex_has_requested_length() {
        let entropy = SequenceEntropy::new(vec![0xabc, 0xdef]);
        let hex = entropy.hex(40);
        assert_eq!(hex.len(), 40);
        assert!(hex.chars().all(|ch| ch.is_ascii_hexdigit()));
        assert_eq!(UuidEntropy.hex(40).len(), 40);
    }

    #[test]
    fn short_hash_keeps_both_ends() {
        let registry = Registry::with_fixtures();
        assert_eq!(registry.records()[0].short_hash(), "0x1a2b3c4d...34567890");
    }
}
