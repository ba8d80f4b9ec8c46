//! Private-data product chaincode and the local peer that drives it.
//!
//! * [`contracts`] — the `Chaincode`/`ChaincodeStub` seam and the product
//!   handler ([`contracts::MediumChaincode`]).
//! * [`ledger`] — committed private data: collections, write sets, in-memory
//!   and file-backed state.
//! * [`peer`] — transaction simulation: tx ids, staged writes, commit on
//!   success only.

pub mod contracts;
pub mod ledger;
pub mod peer;

mod encoding;
