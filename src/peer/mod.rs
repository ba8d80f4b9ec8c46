//! Local peer emulator.
//!
//! Each [`Invocation`] is simulated against a [`TxStub`] that reads committed
//! state and buffers writes. The buffered write set reaches the ledger only
//! when the chaincode answers with an OK status and the invocation is not a
//! query, so a failed invocation leaves no partial writes behind.

use rand::{rngs::OsRng, RngCore};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::contracts::{Chaincode, ChaincodeStub, Response};
use crate::ledger::{PrivateDataLedger, StorageError, WriteSet};

pub const NONCE_LEN: usize = 24;

#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum InvocationKind {
    Init,
    #[default]
    Invoke,
    Query,
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct Invocation {
    pub kind: InvocationKind,
    /// Function name followed by its parameters.
    pub args: Vec<String>,
}

impl Invocation {
    pub fn new<I, S>(kind: InvocationKind, function: &str, params: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut args = vec![function.to_string()];
        args.extend(params.into_iter().map(Into::into));
        Self { kind, args }
    }

    pub fn invoke<I, S>(function: &str, params: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self::new(InvocationKind::Invoke, function, params)
    }

    pub fn query<I, S>(function: &str, params: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self::new(InvocationKind::Query, function, params)
    }

    pub fn function(&self) -> &str {
        self.args.first().map(String::as_str).unwrap_or_default()
    }
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct ProposalResponse {
    pub tx_id: String,
    #[serde(flatten)]
    pub response: Response,
    pub committed: bool,
}

impl ProposalResponse {
    pub fn is_ok(&self) -> bool {
        self.response.is_ok()
    }
}

/// Transaction id: hex(SHA-256(nonce || creator)).
pub fn compute_tx_id(nonce: &[u8], creator: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(nonce);
    hasher.update(creator);
    hex::encode(hasher.finalize())
}

fn fresh_tx_id(creator: &str) -> String {
    let mut nonce = [0u8; NONCE_LEN];
    OsRng.fill_bytes(&mut nonce);
    compute_tx_id(&nonce, creator.as_bytes())
}

/// Transaction-scoped stub. Reads see committed state only.
pub struct TxStub<'a, L: PrivateDataLedger + ?Sized> {
    ledger: &'a L,
    tx_id: String,
    args: Vec<String>,
    writes: WriteSet,
}

impl<'a, L: PrivateDataLedger + ?Sized> TxStub<'a, L> {
    pub fn new(ledger: &'a L, tx_id: String, args: Vec<String>) -> Self {
        Self {
            ledger,
            tx_id,
            args,
            writes: WriteSet::new(),
        }
    }

    pub fn into_write_set(self) -> WriteSet {
        self.writes
    }
}

impl<'a, L: PrivateDataLedger + ?Sized> ChaincodeStub for TxStub<'a, L> {
    fn tx_id(&self) -> &str {
        &self.tx_id
    }

    fn string_args(&self) -> &[String] {
        &self.args
    }

    fn get_private_data(
        &self,
        collection: &str,
        key: &str,
    ) -> Result<Option<Vec<u8>>, StorageError> {
        let value = self.ledger.get(collection, key)?;
        tracing::trace!(
            op = "stub.getPrivateData",
            collection,
            key,
            hit = value.is_some(),
            "Private data read"
        );
        Ok(value)
    }

    fn put_private_data(
        &mut self,
        collection: &str,
        key: &str,
        value: &[u8],
    ) -> Result<(), StorageError> {
        self.ledger.collections().validate(collection, key)?;
        self.writes.put(collection, key, value.to_vec());
        tracing::trace!(op = "stub.putPrivateData", collection, key, "Private data staged");
        Ok(())
    }
}

pub struct Peer<L, C> {
    ledger: L,
    chaincode: C,
    creator: String,
}

impl<L: PrivateDataLedger, C: Chaincode> Peer<L, C> {
    pub fn new(ledger: L, chaincode: C, creator: impl Into<String>) -> Self {
        Self {
            ledger,
            chaincode,
            creator: creator.into(),
        }
    }

    pub fn ledger(&self) -> &L {
        &self.ledger
    }

    /// Runs one invocation. Only ledger failures while committing surface as
    /// `Err`; chaincode failures come back as a non-OK response.
    pub fn execute(&mut self, invocation: Invocation) -> Result<ProposalResponse, StorageError> {
        let tx_id = fresh_tx_id(&self.creator);
        let span = tracing::info_span!(
            "tx",
            tx_id = %tx_id,
            kind = ?invocation.kind,
            function = invocation.function()
        );
        let _guard = span.enter();

        let mut stub = TxStub::new(&self.ledger, tx_id.clone(), invocation.args);
        let response = match invocation.kind {
            InvocationKind::Init => self.chaincode.init(&mut stub),
            InvocationKind::Invoke | InvocationKind::Query => self.chaincode.invoke(&mut stub),
        };
        let writes = stub.into_write_set();

        let committed = if !response.is_ok() {
            if !writes.is_empty() {
                tracing::info!(
                    op = "peer.discard",
                    writes = writes.len(),
                    "Discarding write set of failed invocation"
                );
            }
            false
        } else if invocation.kind == InvocationKind::Query {
            false
        } else {
            self.ledger.commit(writes)?;
            true
        };

        tracing::debug!(
            op = "peer.execute",
            status = response.status,
            committed,
            "Invocation finished"
        );

        Ok(ProposalResponse {
            tx_id,
            response,
            committed,
        })
    }
}
