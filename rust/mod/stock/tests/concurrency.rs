//! Claims racing from many threads against one file-backed store.

use std::collections::HashSet;
use std::sync::Arc;
use std::thread;

use stockroom_core::{ServiceError, StockLimits};
use stockroom_sql::{SQLStore, SqliteStore};
use stockroom_stock::StockModule;
use stockroom_stock::bot::AnyBot;
use stockroom_stock::model::NewProduct;

const AVAILABLE: usize = 40;
const BUYERS: usize = 16;
const PER_BUYER_CLAIMS: usize = 5;

fn module(dir: &tempfile::TempDir) -> StockModule {
    let path = dir.path().join("stock.sqlite");
    let db: Arc<dyn SQLStore> = Arc::new(SqliteStore::open(&path).unwrap());
    let m = StockModule::new(db, StockLimits::default(), Arc::new(AnyBot)).unwrap();
    m.catalog()
        .create_product(1, NewProduct {
            product_id: "X".into(),
            name: "Contended".into(),
            price: 100,
            ..Default::default()
        })
        .unwrap();
    let payloads: Vec<String> = (0..AVAILABLE).map(|i| format!("cred-{i:03}")).collect();
    m.bulk().add_stock(1, "X", &payloads).unwrap();
    m
}

#[test]
fn concurrent_claims_never_oversell() {
    let dir = tempfile::tempdir().unwrap();
    let m = module(&dir);

    let claimed: Vec<Vec<String>> = thread::scope(|s| {
        let handles: Vec<_> = (0..BUYERS)
            .map(|buyer| {
                let m = &m;
                s.spawn(move || {
                    let mut mine = Vec::new();
                    for attempt in 0..PER_BUYER_CLAIMS {
                        let quantity = (buyer % 3 + 1) as i64;
                        let tx = format!("tx-{buyer}-{attempt}");
                        match m.allocation().claim(1, "X", quantity, &tx) {
                            Ok(result) => {
                                assert_eq!(result.units.len(), quantity as usize);
                                mine.extend(result.units.into_iter().map(|u| u.payload));
                            }
                            Err(ServiceError::StockExhausted(_)) => {
                                assert!(m.pool().units_by_transaction(&tx).unwrap().is_empty());
                            }
                            Err(other) => panic!("unexpected claim error: {other}"),
                        }
                    }
                    mine
                })
            })
            .collect();
        handles.into_iter().map(|h| h.join().unwrap()).collect()
    });

    let all: Vec<String> = claimed.into_iter().flatten().collect();
    let distinct: HashSet<&String> = all.iter().collect();

    assert!(all.len() <= AVAILABLE);
    assert_eq!(distinct.len(), all.len(), "a unit was handed out twice");

    let left = m.pool().count_available(1, "X").unwrap() as usize;
    assert_eq!(left + all.len(), AVAILABLE);
}

#[test]
fn failed_claims_leave_no_trace_under_contention() {
    let dir = tempfile::tempdir().unwrap();
    let m = module(&dir);

    // Every claim asks for more than exists, so all must fail cleanly.
    thread::scope(|s| {
        for buyer in 0..BUYERS {
            let m = &m;
            s.spawn(move || {
                let tx = format!("greedy-{buyer}");
                let err = m
                    .allocation()
                    .claim(1, "X", (AVAILABLE + 1) as i64, &tx)
                    .unwrap_err();
                assert!(matches!(err, ServiceError::StockExhausted(_)));
            });
        }
    });

    assert_eq!(m.pool().count_available(1, "X").unwrap() as usize, AVAILABLE);

    // FIFO order is intact after all the rollbacks.
    let first = m.allocation().claim(1, "X", 1, "after").unwrap();
    assert_eq!(first.payloads(), vec!["cred-000"]);
}
