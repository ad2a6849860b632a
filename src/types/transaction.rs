/*
    Copyright © 2023, ParallelChain Lab
    Licensed under the Apache License, Version 2.0: http://www.apache.org/licenses/LICENSE-2.0
*/

//! Definitions for the [Transaction] and [TransactionList] types.
//!
//! Transaction contents are opaque to the block manager: the execution engine decodes raw bytes
//! into transactions and computes the root hash committed for a list in a block header. The block
//! manager only moves transactions around, checks committed hashes, and records locators for them
//! on finalization.

use crate::types::basic::CryptoHash;

/// A single transaction: its raw bytes and the stable id assigned by the execution engine.
#[derive(Clone, PartialEq, Eq)]
pub struct Transaction {
    bytes: Vec<u8>,
    id: CryptoHash,
}

impl Transaction {
    pub fn new(bytes: Vec<u8>, id: CryptoHash) -> Transaction {
        Transaction { bytes, id }
    }

    pub fn bytes(&self) -> &[u8] {
        &self.bytes
    }

    pub fn id(&self) -> CryptoHash {
        self.id
    }
}

/// An ordered sequence of transactions together with the root hash the execution engine computed
/// over it. Only the engine constructs values of this type, so a list's hash is authoritative for
/// its contents.
#[derive(Clone, PartialEq, Eq)]
pub struct TransactionList {
    transactions: Vec<Transaction>,
    hash: CryptoHash,
}

impl TransactionList {
    pub fn new(transactions: Vec<Transaction>, hash: CryptoHash) -> TransactionList {
        TransactionList { transactions, hash }
    }

    /// The root hash committed for this list in a block header.
    pub fn hash(&self) -> CryptoHash {
        self.hash
    }

    pub fn get(&self, index: usize) -> Option<&Transaction> {
        self.transactions.get(index)
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Transaction> {
        self.transactions.iter()
    }

    pub fn len(&self) -> usize {
        self.transactions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.transactions.is_empty()
    }

    /// The raw bytes of each transaction, in order. This is the form a list takes in a serialized
    /// block body.
    pub fn to_bytes_vec(&self) -> Vec<Vec<u8>> {
        self.transactions
            .iter()
            .map(|tx| tx.bytes().to_vec())
            .collect()
    }
}
