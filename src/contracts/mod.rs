use serde::{Deserialize, Serialize};

use crate::ledger::StorageError;

pub mod medium;

pub use medium::{MediumChaincode, Product, ProductPrice};

pub const OK: i32 = 200;
pub const ERROR_THRESHOLD: i32 = 400;
pub const ERROR: i32 = 500;

/// Host-provided view of one transaction: its arguments and private data.
pub trait ChaincodeStub {
    fn tx_id(&self) -> &str;

    fn string_args(&self) -> &[String];

    /// Splits the arguments into the function name and its parameters.
    fn function_and_parameters(&self) -> (&str, &[String]) {
        match self.string_args().split_first() {
            Some((function, params)) => (function.as_str(), params),
            None => ("", &[] as &[String]),
        }
    }

    /// Returns `None` when nothing is stored under `key`.
    fn get_private_data(&self, collection: &str, key: &str)
        -> Result<Option<Vec<u8>>, StorageError>;

    fn put_private_data(
        &mut self,
        collection: &str,
        key: &str,
        value: &[u8],
    ) -> Result<(), StorageError>;
}

pub trait Chaincode {
    fn init(&self, stub: &mut dyn ChaincodeStub) -> Response;

    fn invoke(&self, stub: &mut dyn ChaincodeStub) -> Response;
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct Response {
    pub status: i32,
    pub message: String,
    #[serde(with = "crate::encoding::base64_bytes")]
    pub payload: Vec<u8>,
}

impl Response {
    pub fn success(payload: Vec<u8>) -> Self {
        Self {
            status: OK,
            message: String::new(),
            payload,
        }
    }

    pub fn error(message: impl Into<String>) -> Self {
        Self {
            status: ERROR,
            message: message.into(),
            payload: Vec::new(),
        }
    }

    pub fn is_ok(&self) -> bool {
        self.status < ERROR_THRESHOLD
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ContractError {
    #[error("Invalid invoke function name.")]
    InvalidFunction(String),
    #[error("Incorrect number of arguments for {function}. Expecting {expected}, got {actual}")]
    Arity {
        function: &'static str,
        expected: usize,
        actual: usize,
    },
    #[error("Error parsing the values: {field} {value:?} is not a number")]
    Parse { field: &'static str, value: String },
    #[error("failed to serialize {record}: {source}")]
    Serialize {
        record: &'static str,
        #[source]
        source: serde_json::Error,
    },
    #[error(transparent)]
    Storage(#[from] StorageError),
    #[error("no record under {key:?} in {collection}")]
    NotFound { collection: String, key: String },
    #[error("failed to unmarshal object with id {key:?} from {collection}: {source}")]
    Deserialize {
        collection: String,
        key: String,
        #[source]
        source: serde_json::Error,
    },
}
