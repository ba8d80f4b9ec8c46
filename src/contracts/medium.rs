//! Product chaincode keeping a shared product record and a restricted price
//! record under the same id in two private data collections.

use serde::{de::DeserializeOwned, Deserialize, Serialize};

use super::{Chaincode, ChaincodeStub, ContractError, Response};
use crate::ledger::{COLLECTION_MEDIUM, COLLECTION_PRIVATE};

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "PascalCase")]
pub struct Product {
    pub id: String,
    pub name: String,
    pub color: String,
    pub length: String,
    pub width: String,
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "PascalCase")]
pub struct ProductPrice {
    pub id: String,
    pub buy_price: f64,
    pub sell_price: f64,
}

#[derive(Clone, Copy, Debug, Default)]
pub struct MediumChaincode;

impl MediumChaincode {
    pub fn new() -> Self {
        Self
    }

    fn dispatch(
        &self,
        stub: &mut dyn ChaincodeStub,
        function: &str,
        args: &[String],
    ) -> Result<Vec<u8>, ContractError> {
        match function {
            "createProduct" => self.create_product(stub, args),
            "getProduct" => self.get_product(stub, args),
            "getProductPrice" => self.get_product_price(stub, args),
            other => Err(ContractError::InvalidFunction(other.to_string())),
        }
    }

    fn create_product(
        &self,
        stub: &mut dyn ChaincodeStub,
        args: &[String],
    ) -> Result<Vec<u8>, ContractError> {
        let [id, name, color, length, width, buy_price, sell_price] =
            expect_args::<7>("createProduct", args)?;

        let product = Product {
            id: id.clone(),
            name: name.clone(),
            color: color.clone(),
            length: length.clone(),
            width: width.clone(),
        };
        let price = ProductPrice {
            id: id.clone(),
            buy_price: parse_price("BuyPrice", buy_price)?,
            sell_price: parse_price("SellPrice", sell_price)?,
        };

        let product_bytes = encode("product", &product)?;
        let price_bytes = encode("productPrice", &price)?;

        stub.put_private_data(COLLECTION_MEDIUM, id, &product_bytes)?;
        stub.put_private_data(COLLECTION_PRIVATE, id, &price_bytes)?;

        tracing::info!(
            op = "medium.createProduct",
            tx_id = stub.tx_id(),
            id = %id,
            "Product stored"
        );
        Ok(product_bytes)
    }

    fn get_product(
        &self,
        stub: &mut dyn ChaincodeStub,
        args: &[String],
    ) -> Result<Vec<u8>, ContractError> {
        let [id] = expect_args::<1>("getProduct", args)?;
        let product: Product = read_record(stub, COLLECTION_MEDIUM, id)?;
        encode("product", &product)
    }

    fn get_product_price(
        &self,
        stub: &mut dyn ChaincodeStub,
        args: &[String],
    ) -> Result<Vec<u8>, ContractError> {
        let [id] = expect_args::<1>("getProductPrice", args)?;
        let price: ProductPrice = read_record(stub, COLLECTION_PRIVATE, id)?;
        encode("productPrice", &price)
    }
}

impl Chaincode for MediumChaincode {
    fn init(&self, stub: &mut dyn ChaincodeStub) -> Response {
        tracing::info!(op = "medium.init", tx_id = stub.tx_id(), "Successfully init chaincode");
        Response::success(Vec::new())
    }

    fn invoke(&self, stub: &mut dyn ChaincodeStub) -> Response {
        let (function, args) = stub.function_and_parameters();
        let function = function.to_string();
        let args = args.to_vec();

        let span = tracing::info_span!("invoke", tx_id = stub.tx_id(), function = %function);
        let _guard = span.enter();
        tracing::debug!("Start invoke");

        let response = match self.dispatch(stub, &function, &args) {
            Ok(payload) => Response::success(payload),
            Err(err) => {
                tracing::warn!(op = "medium.invoke.failed", error = %err, "Invocation failed");
                Response::error(err.to_string())
            }
        };

        tracing::debug!(status = response.status, "Stop invoke");
        response
    }
}

fn expect_args<'a, const N: usize>(
    function: &'static str,
    args: &'a [String],
) -> Result<&'a [String; N], ContractError> {
    args.try_into().map_err(|_| ContractError::Arity {
        function,
        expected: N,
        actual: args.len(),
    })
}

fn parse_price(field: &'static str, value: &str) -> Result<f64, ContractError> {
    value
        .parse::<f64>()
        .ok()
        .filter(|v| v.is_finite())
        .ok_or_else(|| ContractError::Parse {
            field,
            value: value.to_string(),
        })
}

fn encode<T: Serialize>(record: &'static str, value: &T) -> Result<Vec<u8>, ContractError> {
    serde_json::to_vec(value).map_err(|source| ContractError::Serialize { record, source })
}

fn read_record<T: DeserializeOwned>(
    stub: &dyn ChaincodeStub,
    collection: &str,
    key: &str,
) -> Result<T, ContractError> {
    let bytes = match stub.get_private_data(collection, key)? {
        Some(bytes) if !bytes.is_empty() => bytes,
        _ => {
            return Err(ContractError::NotFound {
                collection: collection.to_string(),
                key: key.to_string(),
            })
        }
    };
    serde_json::from_slice(&bytes).map_err(|source| {
        tracing::warn!(
            op = "medium.unmarshal.failed",
            collection,
            key,
            "Error unmarshalling object"
        );
        ContractError::Deserialize {
            collection: collection.to_string(),
            key: key.to_string(),
            source,
        }
    })
}
