use serde::{Deserialize, Serialize};

/// Sequential identifier of a loan request. Assigned by the ledger store,
/// starting at 0, never reused.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct RequestId(pub u64);

impl std::fmt::Display for RequestId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Sequential identifier of an active loan. Independent namespace from
/// request ids.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct LoanId(pub u64);

impl std::fmt::Display for LoanId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Opaque identity of a borrower, lender, or operator.
///
/// The engine never interprets the contents; hosts map these to whatever
/// identity scheme they settle against (addresses, account ids, DIDs).
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PartyId(pub String);

impl PartyId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl std::fmt::Display for PartyId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Fixed-size commitment to off-chain evidence (metadata, appraisals).
///
/// Recorded verbatim and never opened: the engine is the ledger of what was
/// pledged, not a verifier of the referenced assets.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Commitment(pub [u8; 32]);

impl Commitment {
    pub fn new(digest: [u8; 32]) -> Self {
        Self(digest)
    }

    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }
}

impl std::fmt::Display for Commitment {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", hex::encode(self.0))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ids_render_as_plain_integers() {
        assert_eq!(RequestId(7).to_string(), "7");
        assert_eq!(LoanId(0).to_string(), "0");
    }

    #[test]
    fn commitment_renders_as_hex() {
        let commitment = Commitment::new([0xab; 32]);
        assert_eq!(commitment.to_string(), "ab".repeat(32));
    }

    #[test]
    fn party_id_roundtrips_through_serde() {
        let party = PartyId::new("lender-1");
        let encoded = serde_json::to_string(&party).unwrap();
        assert_eq!(serde_json::from_str::<PartyId>(&encoded).unwrap(), party);
    }
}
