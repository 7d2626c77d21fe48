//! Opaque byte identifiers used as map and set keys.
//!
//! The ledger addresses transactions and substates by opaque byte
//! sequences. These newtypes give those sequences value equality, hashing
//! and ordering, so they can be used directly as `HashMap`/`HashSet` keys
//! throughout the gateway without ad-hoc comparer plumbing.
//!
//! Both types render as lowercase hex in `Display` and `Debug` output,
//! which is the form operators see in logs and errors.

use std::fmt;

/// The identifier hash of a ledger transaction.
#[derive(Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TransactionId(Vec<u8>);

impl TransactionId {
    /// Wraps raw identifier bytes.
    pub fn new(bytes: Vec<u8>) -> Self {
        Self(bytes)
    }

    /// Parses a lowercase/uppercase hex string.
    ///
    /// Returns `None` if the input is not valid hex.
    pub fn from_hex(s: &str) -> Option<Self> {
        hex::decode(s).ok().map(Self)
    }

    /// The raw identifier bytes.
    pub fn as_slice(&self) -> &[u8] {
        &self.0
    }

    /// Consumes the identifier, returning the raw bytes.
    pub fn into_vec(self) -> Vec<u8> {
        self.0
    }

    /// Renders the identifier as lowercase hex.
    pub fn to_hex(&self) -> String {
        hex::encode(&self.0)
    }
}

impl From<Vec<u8>> for TransactionId {
    fn from(bytes: Vec<u8>) -> Self {
        Self(bytes)
    }
}

impl From<&[u8]> for TransactionId {
    fn from(bytes: &[u8]) -> Self {
        Self(bytes.to_vec())
    }
}

impl fmt::Display for TransactionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_hex())
    }
}

impl fmt::Debug for TransactionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "TransactionId({})", self.to_hex())
    }
}

/// Length in bytes of a physical substate identifier: a 32-byte
/// transaction hash followed by a 4-byte operation index.
pub const PHYSICAL_SUBSTATE_ID_LEN: usize = 36;

/// The identifier of a substate: an individually up/downable unit of
/// ledger state.
///
/// Physical substates are identified by the transaction hash and operation
/// index that created them ([`PHYSICAL_SUBSTATE_ID_LEN`] bytes). Virtual
/// substates - default states that logically always exist, such as empty
/// balances - carry data-derived identifiers of a different length, and
/// may be downed without ever having been upped.
#[derive(Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SubstateId(Vec<u8>);

impl SubstateId {
    /// Wraps raw identifier bytes.
    pub fn new(bytes: Vec<u8>) -> Self {
        Self(bytes)
    }

    /// Parses a hex string. Returns `None` if the input is not valid hex.
    pub fn from_hex(s: &str) -> Option<Self> {
        hex::decode(s).ok().map(Self)
    }

    /// The raw identifier bytes.
    pub fn as_slice(&self) -> &[u8] {
        &self.0
    }

    /// Consumes the identifier, returning the raw bytes.
    pub fn into_vec(self) -> Vec<u8> {
        self.0
    }

    /// Renders the identifier as lowercase hex.
    pub fn to_hex(&self) -> String {
        hex::encode(&self.0)
    }

    /// Whether this identifier denotes a virtual substate.
    ///
    /// Virtual substates model default/zero states that logically always
    /// exist, so they may be downed without a prior up. They are
    /// recognized by identifier shape: anything that is not a physical
    /// (transaction hash + operation index) identifier is virtual.
    pub fn is_virtual(&self) -> bool {
        self.0.len() != PHYSICAL_SUBSTATE_ID_LEN
    }
}

impl From<Vec<u8>> for SubstateId {
    fn from(bytes: Vec<u8>) -> Self {
        Self(bytes)
    }
}

impl From<&[u8]> for SubstateId {
    fn from(bytes: &[u8]) -> Self {
        Self(bytes.to_vec())
    }
}

impl fmt::Display for SubstateId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_hex())
    }
}

impl fmt::Debug for SubstateId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "SubstateId({})", self.to_hex())
    }
}
