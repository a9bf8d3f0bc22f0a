/// An unlocked signing capability bound to one account.
///
/// Key custody lives outside this crate; the core only ever sees this
/// handle and passes it through to the ledger and registry clients.
pub trait Signer: Send + Sync {
    /// Account address the signer authorizes for
    fn address(&self) -> &str;
}

/// Signer that only carries an address. Ledger clients that sign
/// out-of-process (hardware wallets, remote signers) use it as the handle.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AddressSigner {
    address: String,
}

impl AddressSigner {
    pub fn new(address: impl Into<String>) -> Self {
        Self {
            address: address.into(),
        }
    }
}

impl Signer for AddressSigner {
    fn address(&self) -> &str {
        &self.address
    }
}
