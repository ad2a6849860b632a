/*
    Copyright © 2023, ParallelChain Lab
    Licensed under the Apache License, Version 2.0: http://www.apache.org/licenses/LICENSE-2.0
*/

//! Definitions for the [Wallet] type: the signing identity of this node, used to stamp proposed
//! blocks with a proposer address.

use ed25519_dalek::{Signer, SigningKey, VerifyingKey};

use super::basic::{Address, SignatureBytes};

/// A wrapper around [SigningKey](ed25519_dalek::SigningKey) which exposes the node's proposer
/// [address](Address) and a convenience method for creating signatures.
pub struct Wallet(SigningKey);

impl Wallet {
    pub fn new(signing_key: SigningKey) -> Wallet {
        Wallet(signing_key)
    }

    /// The proposer address derived from this wallet's verifying key.
    pub fn address(&self) -> Address {
        Address::from_verifying_key(&self.0.verifying_key())
    }

    /// Convenience method for creating signatures over values or messages represented as vectors of
    /// bytes.
    pub fn sign(&self, message: &[u8]) -> SignatureBytes {
        SignatureBytes::new(self.0.sign(message).to_bytes())
    }

    pub fn public(&self) -> VerifyingKey {
        self.0.verifying_key()
    }
}
