use std::sync::Arc;
use std::thread;
use std::time::Duration;

use rand::rngs::SmallRng;
use rand::{Rng, SeedableRng};

use heapdb::common::TableID;
use heapdb::concurrency::LockMode;
use heapdb::error::{Error, Result};
use heapdb::execution::{Aggregate, AggregateOp, DbIterator, Insert, SeqScan, TupleList};
use heapdb::storage::tuple::{Field, Tuple, TupleDesc, Type};
use heapdb::{Config, Database};

const WORKERS: usize = 4;
const ROWS_PER_WORKER: usize = 50;

fn main() -> Result<()> {
    let args: Vec<String> = std::env::args().collect();
    let config = match args.len() {
        1 => Config::load(None)?,
        2 => Config::load(Some(&args[1]))?,
        _ => return Err(Error::Config("Usage: heapdb [config_file_path]".to_string())),
    };
    println!("Opening heapdb in {}...", config.data_dir.display());
    let db = Arc::new(Database::open(config)?);

    let desc = TupleDesc::new(&[Type::Int, Type::Int, Type::Str], &["worker", "amount", "note"]);
    let table = db.create_table("ledger", desc.clone())?;

    let handles: Vec<_> = (0..WORKERS)
        .map(|worker| {
            let db = db.clone();
            let desc = desc.clone();
            thread::spawn(move || run_worker(&db, table, &desc, worker))
        })
        .collect();
    let mut retries = 0;
    for handle in handles {
        retries += handle.join().map_err(|_| Error::Internal("Worker thread panicked".into()))??;
    }
    println!("{} workers committed after {} deadlock retries", WORKERS, retries);

    let txn = db.begin();
    let scan = SeqScan::new(txn.id(), table, Some("ledger"), db.pool().clone(), LockMode::Shared)?;
    let mut sums = Aggregate::new(Box::new(scan), 1, Some(0), AggregateOp::Sum)?;
    sums.open()?;
    let names: Vec<&str> = sums.tuple_desc().items().iter().filter_map(|item| item.name.as_deref()).collect();
    println!("{}", names.join("\t"));
    while let Some(tuple) = sums.next()? {
        println!("{}", tuple);
    }
    sums.close();
    txn.commit()
}

/// Inserts this worker's rows in one transaction, retrying from scratch whenever it is chosen
/// as a deadlock victim. Returns the number of retries.
fn run_worker(db: &Database, table: TableID, desc: &TupleDesc, worker: usize) -> Result<usize> {
    let mut rng = SmallRng::seed_from_u64(worker as u64);
    let rows: Vec<Tuple> = (0..ROWS_PER_WORKER)
        .map(|i| {
            Tuple::new(vec![
                Field::Int(worker as i32),
                Field::Int(rng.gen_range(1..=100)),
                Field::Str(format!("w{}-{}", worker, i)),
            ])
        })
        .collect();

    let mut retries = 0;
    loop {
        let txn = db.begin();
        let inserted = Insert::new(
            txn.id(),
            Box::new(TupleList::new(desc.clone(), rows.clone())),
            table,
            db.pool().clone(),
        )
        .and_then(|mut insert| {
            insert.open()?;
            let count = insert.next()?;
            insert.close();
            Ok(count)
        });
        match inserted {
            Ok(_) => {
                txn.commit()?;
                return Ok(retries);
            }
            Err(Error::Deadlock(reason)) => {
                println!("Worker {} aborted {}: {}", worker, txn.id(), reason);
                txn.abort();
                retries += 1;
                thread::sleep(Duration::from_millis(rng.gen_range(1..50)));
            }
            Err(err) => return Err(err),
        }
    }
}
