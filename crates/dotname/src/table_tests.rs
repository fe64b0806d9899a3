use std::sync::Arc;
use std::thread;

use crate::encoding::SymbolEncoding;
use crate::name::{ScopedStatName, StatName, StatNameJoiner, StatNameStorage};
use crate::table::SymbolTable;

#[test]
fn encode_decode_round_trip() {
    let table = SymbolTable::new();
    let name = ScopedStatName::new("cluster.x.rq_total", &table);

    assert_eq!(table.decode(name.stat_name()), "cluster.x.rq_total");
    assert_eq!(table.len(), 3);
}

#[test]
fn shared_tokens_intern_once() {
    let table = SymbolTable::new();
    let first = ScopedStatName::new("cluster.x.rq_total", &table);
    let second = ScopedStatName::new("cluster.y.rq_total", &table);

    // Only `y` is new.
    assert_eq!(table.len(), 4);

    drop(first);
    // `x` had no other references; `cluster` and `rq_total` survive.
    assert_eq!(table.len(), 3);
    assert_eq!(table.decode(second.stat_name()), "cluster.y.rq_total");
}

#[test]
fn empty_name_round_trips_without_interning() {
    let table = SymbolTable::new();
    let name = ScopedStatName::new("", &table);

    assert_eq!(name.stat_name().data_size(), 0);
    assert_eq!(table.decode(name.stat_name()), "");
    assert_eq!(table.len(), 0);
}

#[test]
fn empty_tokens_intern_like_any_other() {
    let table = SymbolTable::new();
    let name = ScopedStatName::new("a..b", &table);

    assert_eq!(table.len(), 3);
    assert_eq!(table.decode(name.stat_name()), "a..b");
}

#[test]
fn join_decodes_to_dotted_concatenation() {
    let table = SymbolTable::new();
    let a = ScopedStatName::new("http.downstream", &table);
    let b = ScopedStatName::new("rq_200", &table);

    let joined = StatNameJoiner::new(a.stat_name(), b.stat_name());
    assert_eq!(table.decode(joined.stat_name()), "http.downstream.rq_200");
}

#[test]
fn repeated_tokens_share_one_entry() {
    let table = SymbolTable::new();
    let name = ScopedStatName::new("a.a.a.a.a", &table);

    assert_eq!(table.len(), 1);
    assert_eq!(table.dump(), "1: 'a' (5)\n");
    assert_eq!(table.decode(name.stat_name()), "a.a.a.a.a");
}

#[test]
fn released_ids_are_reused_lifo() {
    let table = SymbolTable::new();
    let mut ab = StatNameStorage::new("a.b", &table);
    assert_eq!(ab.stat_name().data(), &[1, 2][..]);
    ab.release(&table);

    // `b`'s id was freed last, so it goes out first.
    let c = ScopedStatName::new("c", &table);
    assert_eq!(c.stat_name().data(), &[2][..]);
    let d = ScopedStatName::new("d", &table);
    assert_eq!(d.stat_name().data(), &[1][..]);

    // Pool exhausted; the monotonic counter takes over again.
    let e = ScopedStatName::new("e", &table);
    assert_eq!(e.stat_name().data(), &[3][..]);
}

#[test]
fn re_encoding_after_release_still_round_trips() {
    let table = SymbolTable::new();
    let mut first = StatNameStorage::new("x.y", &table);
    let before = first.stat_name().data().to_vec();
    first.release(&table);

    // Free-pool reuse hands out different ids the second time around;
    // decoding must not care.
    let second = ScopedStatName::new("x.y", &table);
    assert_ne!(second.stat_name().data(), &before[..]);
    assert_eq!(table.decode(second.stat_name()), "x.y");
}

#[test]
fn ids_beyond_127_use_two_byte_payloads() {
    let table = SymbolTable::new();
    let names: Vec<ScopedStatName<'_>> = (0..200)
        .map(|i| ScopedStatName::new(&format!("tok_{i}"), &table))
        .collect();
    assert_eq!(table.len(), 200);

    for (i, name) in names.iter().enumerate() {
        let id = (i + 1) as u32;
        let data = name.stat_name().data();
        assert_eq!(data.len(), if id < 128 { 1 } else { 2 }, "payload of id {id}");
        assert_eq!(SymbolEncoding::decode_symbols(data).unwrap(), vec![id]);
        assert_eq!(table.decode(name.stat_name()), format!("tok_{i}"));
    }
}

#[test]
fn retain_adds_references() {
    let table = SymbolTable::new();
    let name = ScopedStatName::new("cluster.c1.rq", &table);
    let mut copy = StatNameStorage::from_stat_name(name.stat_name(), &table);

    // Copying interns nothing new.
    assert_eq!(table.len(), 3);

    drop(name);
    // The copy's references keep every token alive.
    assert_eq!(table.len(), 3);
    assert_eq!(table.decode(copy.stat_name()), "cluster.c1.rq");

    copy.release(&table);
    assert_eq!(table.len(), 0);
}

#[test]
fn less_than_resolves_token_strings() {
    let table = SymbolTable::new();
    // Intern in reverse order so id order and string order disagree.
    let c = ScopedStatName::new("a.c", &table);
    let b = ScopedStatName::new("a.b", &table);

    assert!(table.less_than(b.stat_name(), c.stat_name()));
    assert!(!table.less_than(c.stat_name(), b.stat_name()));
    assert!(!table.less_than(b.stat_name(), b.stat_name()));
}

#[test]
fn shorter_prefix_orders_first() {
    let table = SymbolTable::new();
    let short = ScopedStatName::new("a", &table);
    let long = ScopedStatName::new("a.b", &table);

    assert!(table.less_than(short.stat_name(), long.stat_name()));
    assert!(!table.less_than(long.stat_name(), short.stat_name()));
}

#[test]
fn compare_sorts_names_by_token_strings() {
    let table = SymbolTable::new();
    let names = ["zz.aa", "aa.zz", "aa.bb", "mm"];
    let scoped: Vec<ScopedStatName<'_>> = names
        .iter()
        .map(|name| ScopedStatName::new(name, &table))
        .collect();

    let mut views: Vec<StatName<'_>> = scoped.iter().map(|s| s.stat_name()).collect();
    views.sort_by(|a, b| table.compare(*a, *b));

    let rendered: Vec<String> = views.iter().map(|v| table.decode(*v)).collect();
    assert_eq!(rendered, ["aa.bb", "aa.zz", "mm", "zz.aa"]);
}

#[test]
fn dump_lists_tokens_by_id() {
    let table = SymbolTable::new();
    let name = ScopedStatName::new("cluster.cluster.rq", &table);
    assert_eq!(table.dump(), "1: 'cluster' (2)\n2: 'rq' (1)\n");

    drop(name);
    assert_eq!(table.dump(), "");
}

#[test]
fn concurrent_encodes_agree_on_distinct_tokens() {
    const VOCAB: [&str; 6] = [
        "cluster",
        "listener",
        "http",
        "rq_total",
        "rq_2xx",
        "cx_active",
    ];

    let table = Arc::new(SymbolTable::new());
    let handles: Vec<_> = (0..8)
        .map(|t: usize| {
            let table = Arc::clone(&table);
            thread::spawn(move || {
                (0..50)
                    .map(|i| {
                        let name = format!(
                            "{}.{}",
                            VOCAB[(t + i) % VOCAB.len()],
                            VOCAB[i % VOCAB.len()]
                        );
                        StatNameStorage::new(&name, &table)
                    })
                    .collect::<Vec<_>>()
            })
        })
        .collect();

    let mut storages: Vec<StatNameStorage> = handles
        .into_iter()
        .flat_map(|handle| handle.join().unwrap())
        .collect();

    // However the interleaving went, the vocabulary interned exactly once.
    assert_eq!(table.len(), VOCAB.len());

    for storage in &mut storages {
        storage.release(&table);
    }
    assert_eq!(table.len(), 0);
}

#[test]
fn concurrent_encode_release_churn_reaches_steady_state() {
    let table = Arc::new(SymbolTable::new());
    let mut keeper = StatNameStorage::new("steady.state.name", &table);

    let handles: Vec<_> = (0..4)
        .map(|_| {
            let table = Arc::clone(&table);
            thread::spawn(move || {
                for _ in 0..200 {
                    let mut churn = StatNameStorage::new("steady.state.churn", &table);
                    churn.release(&table);
                }
            })
        })
        .collect();
    for handle in handles {
        handle.join().unwrap();
    }

    // Only the keeper's tokens remain.
    assert_eq!(table.len(), 3);
    keeper.release(&table);
    assert_eq!(table.len(), 0);
}

#[test]
#[should_panic(expected = "dropped without transferring")]
fn discarding_an_encode_result_is_fatal() {
    let table: &'static SymbolTable = Box::leak(Box::new(SymbolTable::new()));
    // Interns three tokens, then drops the encoding with the references
    // still outstanding.
    let _ = table.encode("a.b.c");
}

#[test]
#[should_panic(expected = "dropped with 1 live tokens")]
fn dropping_a_table_with_live_tokens_is_fatal() {
    let table = SymbolTable::new();
    let storage = StatNameStorage::new("leak", &table);
    // Skip the storage's own drop check; the table notices the leak.
    std::mem::forget(storage);
}

#[test]
#[should_panic(expected = "no token for id")]
fn decoding_an_unknown_id_is_fatal() {
    let table = SymbolTable::new();
    let bytes = [1u8, 0, 42]; // id 42 was never interned
    table.decode(StatName::new(&bytes));
}

#[test]
#[should_panic(expected = "corrupt packed name")]
fn decoding_a_truncated_payload_is_fatal() {
    let table = SymbolTable::new();
    let bytes = [1u8, 0, 0x80]; // continuation bit with nothing after it
    table.decode(StatName::new(&bytes));
}
