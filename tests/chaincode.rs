use medium_chaincode::{
    contracts::{MediumChaincode, Product, ProductPrice},
    ledger::{
        Collections, FileLedger, PrivateDataLedger, StorageError, COLLECTION_MEDIUM,
        COLLECTION_PRIVATE,
    },
    peer::{Invocation, Peer},
};

fn open_peer(path: &std::path::Path) -> Result<Peer<FileLedger, MediumChaincode>, StorageError> {
    let ledger = FileLedger::open(path, Collections::default())?;
    Ok(Peer::new(ledger, MediumChaincode::new(), "integration"))
}

fn create(id: &str, buy: &str, sell: &str) -> Invocation {
    Invocation::invoke("createProduct", [id, "Widget", "Red", "10", "5", buy, sell])
}

#[test]
fn widget_example_persists_across_restarts() -> Result<(), StorageError> {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("ledger.json");

    {
        let mut peer = open_peer(&path)?;
        let created = peer.execute(create("p1", "2.50", "4.99"))?;
        assert!(created.is_ok(), "{}", created.response.message);
        let product: Product = serde_json::from_slice(&created.response.payload).unwrap();
        assert_eq!(
            product,
            Product {
                id: "p1".into(),
                name: "Widget".into(),
                color: "Red".into(),
                length: "10".into(),
                width: "5".into(),
            }
        );
    }

    let mut peer = open_peer(&path)?;
    assert_eq!(peer.ledger().height(), 1);

    let fetched = peer.execute(Invocation::query("getProduct", ["p1"]))?;
    let product: Product = serde_json::from_slice(&fetched.response.payload).unwrap();
    assert_eq!(product.name, "Widget");

    let price = peer.execute(Invocation::query("getProductPrice", ["p1"]))?;
    let price: ProductPrice = serde_json::from_slice(&price.response.payload).unwrap();
    assert_eq!(price.id, "p1");
    assert_eq!(price.buy_price, 2.50);
    assert_eq!(price.sell_price, 4.99);
    Ok(())
}

#[test]
fn prices_parse_at_full_precision() -> Result<(), StorageError> {
    let dir = tempfile::tempdir().unwrap();
    let mut peer = open_peer(&dir.path().join("ledger.json"))?;

    let padded = peer.execute(create("p2", "0.1", " 1e3 "))?;
    assert!(!padded.is_ok());
    assert!(!padded.committed);
    assert!(padded
        .response
        .message
        .starts_with("Error parsing the values"));

    let resp = peer.execute(create("p2", "0.1", "1e3"))?;
    assert!(resp.is_ok(), "{}", resp.response.message);

    let price = peer.execute(Invocation::query("getProductPrice", ["p2"]))?;
    let price: ProductPrice = serde_json::from_slice(&price.response.payload).unwrap();
    assert_eq!(price.buy_price, "0.1".parse::<f64>().unwrap());
    assert_eq!(price.sell_price, 1000.0);
    Ok(())
}

#[test]
fn rejected_create_leaves_ledger_untouched() -> Result<(), StorageError> {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("ledger.json");
    let mut peer = open_peer(&path)?;

    let resp = peer.execute(create("p1", "abc", "4.99"))?;
    assert!(!resp.is_ok());
    assert!(!resp.committed);
    assert_eq!(peer.ledger().height(), 0);
    assert_eq!(peer.ledger().get(COLLECTION_MEDIUM, "p1")?, None);
    assert_eq!(peer.ledger().get(COLLECTION_PRIVATE, "p1")?, None);
    // nothing was committed, so nothing was written to disk either
    assert!(!path.exists());
    Ok(())
}

#[test]
fn unknown_ids_and_functions_fail() -> Result<(), StorageError> {
    let dir = tempfile::tempdir().unwrap();
    let mut peer = open_peer(&dir.path().join("ledger.json"))?;

    let missing = peer.execute(Invocation::query("getProduct", ["ghost"]))?;
    assert!(!missing.is_ok());
    assert!(missing.response.payload.is_empty());

    let missing = peer.execute(Invocation::query("getProductPrice", ["ghost"]))?;
    assert!(!missing.is_ok());

    let bogus = peer.execute(Invocation::invoke("updateProduct", ["p1"]))?;
    assert!(bogus
        .response
        .message
        .contains("Invalid invoke function name."));
    Ok(())
}

#[test]
fn transaction_ids_are_unique_hex() -> Result<(), StorageError> {
    let dir = tempfile::tempdir().unwrap();
    let mut peer = open_peer(&dir.path().join("ledger.json"))?;

    let a = peer.execute(Invocation::query("getProduct", ["x"]))?;
    let b = peer.execute(Invocation::query("getProduct", ["x"]))?;
    assert_ne!(a.tx_id, b.tx_id);
    for id in [&a.tx_id, &b.tx_id] {
        assert_eq!(id.len(), 64);
        assert!(id.chars().all(|c| c.is_ascii_hexdigit()));
    }
    Ok(())
}
