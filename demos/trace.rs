use docmatch::{Engine, Value};

const A_QUERY: &str = r#"{
    "exchange_id": 1,
    "deal_ids": {"$in": ["deal-1", "deal-2"]},
    "country": {"$regex": "^(CA|US)$"},
    "$or": [{"private": false}, {"bidfloor": {"$lt": 2.5}}]
}"#;

const A_RECORD: &str = r#"{
    "exchange_id": 1,
    "deal_ids": ["deal-3", "deal-1"],
    "country": "US",
    "private": true,
    "bidfloor": 1.25
}"#;

fn main() {
    let engine = Engine::new();
    let query = Value::from_json_str(A_QUERY).unwrap();
    let matcher = engine.compile(&query).unwrap();

    println!("Compiled tree:");
    matcher.explain();

    let record = Value::from_json_str(A_RECORD).unwrap();
    println!();
    println!("Trace for {record}:");
    let matched = matcher.trace(&record);
    println!();
    println!("=> {}", if matched { "matched" } else { "no match" });
}
