//! Keyspace query engine.
//!
//! A query walks the ordered keyspace once, in the requested direction,
//! filtering keys with a [`Matcher`]. Rows are materialized only for the
//! page being returned; one extra matching key is looked for to report
//! `has_more`.
//!
//! Prefix queries are the only ones that can narrow the scan: an ascending
//! case-sensitive prefix scan starts at the prefix and stops at the first key
//! past it, and a descending one starts just below the prefix's successor.
//! Substring and regex queries always walk the whole directional range.

use bytes::Bytes;
use common::{BytesRange, Record, ScanOptions, Storage};
use regex::{Regex, RegexBuilder};
use tracing::debug;

use crate::error::{Error, Result};
use crate::model::{KeyItem, KeyPage, MatchMode, QuerySpec, SortOrder};
use crate::preview::preview;

/// Upper bound on records prefetched per storage batch.
const MAX_SCAN_BATCH: usize = 1024;

/// Compiled key filter.
#[derive(Debug)]
enum Matcher {
    Prefix { pattern: String, fold_case: bool },
    Substring { pattern: String, fold_case: bool },
    Regex(Regex),
}

impl Matcher {
    /// Compiles `spec`'s pattern. Regex compilation happens once, here.
    fn new(spec: &QuerySpec) -> Result<Self> {
        let fold_case = !spec.case_sensitive;
        let pattern = if fold_case {
            spec.pattern.to_lowercase()
        } else {
            spec.pattern.clone()
        };
        match spec.mode {
            MatchMode::Prefix => Ok(Matcher::Prefix { pattern, fold_case }),
            MatchMode::Substring => Ok(Matcher::Substring { pattern, fold_case }),
            MatchMode::Regex => RegexBuilder::new(&spec.pattern)
                .case_insensitive(fold_case)
                .build()
                .map(Matcher::Regex)
                .map_err(|e| Error::InvalidPattern(e.to_string())),
        }
    }

    fn matches(&self, key: &str) -> bool {
        match self {
            Matcher::Prefix { pattern, fold_case } => {
                if *fold_case {
                    key.to_lowercase().starts_with(pattern.as_str())
                } else {
                    key.starts_with(pattern.as_str())
                }
            }
            Matcher::Substring { pattern, fold_case } => {
                if *fold_case {
                    key.to_lowercase().contains(pattern.as_str())
                } else {
                    key.contains(pattern.as_str())
                }
            }
            Matcher::Regex(regex) => regex.is_match(key),
        }
    }

    /// The raw prefix bytes usable for seeking, if this matcher can bound a
    /// scan at all.
    fn seek_prefix(&self) -> Option<&[u8]> {
        match self {
            Matcher::Prefix {
                pattern,
                fold_case: false,
            } if !pattern.is_empty() => Some(pattern.as_bytes()),
            _ => None,
        }
    }
}

/// Picks the storage range for a query.
fn scan_range(spec: &QuerySpec, matcher: &Matcher) -> BytesRange {
    let start_key = spec
        .start_key
        .as_deref()
        .map(|k| Bytes::copy_from_slice(k.as_bytes()));
    let prefix = matcher.seek_prefix().map(Bytes::copy_from_slice);
    match (spec.order, start_key, prefix) {
        (SortOrder::Asc, Some(start), _) => BytesRange::starting_at(start),
        (SortOrder::Asc, None, Some(prefix)) => BytesRange::starting_at(prefix),
        (SortOrder::Desc, Some(start), _) => BytesRange::ending_at(start),
        (SortOrder::Desc, None, Some(prefix)) => BytesRange::through_prefix(prefix),
        (_, None, None) => BytesRange::unbounded(),
    }
}

/// Whether an ascending scan has left the region where keys can match.
fn past_prefix(order: SortOrder, prefix: Option<&[u8]>, key: &[u8]) -> bool {
    match (order, prefix) {
        (SortOrder::Asc, Some(prefix)) => key > prefix && !key.starts_with(prefix),
        _ => false,
    }
}

fn to_item(record: Record, key: String, preview_chars: usize) -> KeyItem {
    KeyItem {
        key,
        value_preview: preview(&record.value, preview_chars),
        size: record.value.len() as u64,
        expires_at: record
            .expire_ts
            .map(|ms| (ms / 1000).max(0) as u64)
            .unwrap_or(0),
    }
}

/// Runs `spec` against `storage` and returns one page of matching keys.
///
/// # Errors
///
/// Returns [`Error::InvalidInput`] if `spec.limit` is 0,
/// [`Error::InvalidPattern`] if a regex pattern does not compile (before any
/// key is read), and storage errors from the scan.
#[tracing::instrument(
    level = "debug",
    skip_all,
    fields(mode = ?spec.mode, order = ?spec.order, limit = spec.limit, offset = spec.offset)
)]
pub(crate) async fn execute(storage: &dyn Storage, spec: &QuerySpec) -> Result<KeyPage> {
    if spec.limit == 0 {
        return Err(Error::InvalidInput("limit must be positive".to_string()));
    }
    let matcher = Matcher::new(spec)?;
    let range = scan_range(spec, &matcher);
    let options = ScanOptions {
        order: spec.order.scan_order(),
        batch_size: spec.limit.saturating_add(1).min(MAX_SCAN_BATCH),
    };
    let mut iter = storage.scan_iter(range, options).await?;

    let seek_prefix = matcher.seek_prefix();
    let mut to_skip = if spec.start_key.is_some() {
        0
    } else {
        spec.offset
    };
    let mut page = KeyPage::default();
    let mut scanned = 0usize;

    while let Some(record) = iter.next().await? {
        scanned += 1;
        if past_prefix(spec.order, seek_prefix, &record.key) {
            break;
        }
        let key = String::from_utf8_lossy(&record.key).into_owned();
        if !matcher.matches(&key) {
            continue;
        }
        if to_skip > 0 {
            to_skip -= 1;
            continue;
        }
        if page.keys.len() == spec.limit {
            page.has_more = true;
            break;
        }
        page.keys.push(to_item(record, key, spec.preview_chars));
    }

    debug!(
        scanned,
        returned = page.keys.len(),
        has_more = page.has_more,
        "query complete"
    );
    Ok(page)
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use common::storage::in_memory::InMemoryStorage;
    use common::{PutOptions, PutRecordOp, Ttl};
    use rstest::rstest;

    use super::*;

    async fn storage_with(entries: &[(&str, &str)]) -> InMemoryStorage {
        let storage = InMemoryStorage::new();
        let records: Vec<PutRecordOp> = entries
            .iter()
            .map(|(k, v)| {
                Record::new(
                    Bytes::copy_from_slice(k.as_bytes()),
                    Bytes::copy_from_slice(v.as_bytes()),
                )
                .into()
            })
            .collect();
        storage.put(records).await.unwrap();
        storage
    }

    fn keys(page: &KeyPage) -> Vec<&str> {
        page.keys.iter().map(|k| k.key.as_str()).collect()
    }

    async fn user_storage() -> InMemoryStorage {
        storage_with(&[
            ("order:1", "o1"),
            ("user:1", "alice"),
            ("user:2", "bob"),
            ("user:3", "carol"),
            ("zeta", "z"),
        ])
        .await
    }

    #[tokio::test]
    async fn should_page_prefix_matches_with_lookahead() {
        // given
        let storage = user_storage().await;
        let spec = QuerySpec::new("user:", MatchMode::Prefix, 2);

        // when
        let page = execute(&storage, &spec).await.unwrap();

        // then
        assert_eq!(keys(&page), vec!["user:1", "user:2"]);
        assert!(page.has_more);
        assert_eq!(page.keys[0].value_preview, "alice");
        assert_eq!(page.keys[0].size, 5);
    }

    #[tokio::test]
    async fn should_report_no_more_on_last_page() {
        // given
        let storage = user_storage().await;
        let spec = QuerySpec::new("user:", MatchMode::Prefix, 2).with_offset(2);

        // when
        let page = execute(&storage, &spec).await.unwrap();

        // then
        assert_eq!(keys(&page), vec!["user:3"]);
        assert!(!page.has_more);
    }

    #[tokio::test]
    async fn should_not_report_more_when_page_exactly_fills() {
        // given
        let storage = user_storage().await;
        let spec = QuerySpec::new("user:", MatchMode::Prefix, 3);

        // when
        let page = execute(&storage, &spec).await.unwrap();

        // then
        assert_eq!(keys(&page), vec!["user:1", "user:2", "user:3"]);
        assert!(!page.has_more);
    }

    #[tokio::test]
    async fn should_walk_prefix_in_descending_order() {
        // given
        let storage = user_storage().await;
        let spec = QuerySpec::new("user:", MatchMode::Prefix, 10).with_order(SortOrder::Desc);

        // when
        let page = execute(&storage, &spec).await.unwrap();

        // then
        assert_eq!(keys(&page), vec!["user:3", "user:2", "user:1"]);
        assert!(!page.has_more);
    }

    #[rstest]
    #[case(MatchMode::Substring, "er:", vec!["order:1", "user:1", "user:2", "user:3"])]
    #[case(MatchMode::Regex, r"^user:[13]$", vec!["user:1", "user:3"])]
    #[case(MatchMode::Prefix, "", vec!["order:1", "user:1", "user:2", "user:3", "zeta"])]
    #[case(MatchMode::Substring, "", vec!["order:1", "user:1", "user:2", "user:3", "zeta"])]
    #[case(MatchMode::Prefix, "nomatch", vec![])]
    #[tokio::test]
    async fn should_filter_keys_by_mode(
        #[case] mode: MatchMode,
        #[case] pattern: &str,
        #[case] expected: Vec<&str>,
    ) {
        // given
        let storage = user_storage().await;
        let spec = QuerySpec::new(pattern, mode, 10);

        // when
        let page = execute(&storage, &spec).await.unwrap();

        // then
        assert_eq!(keys(&page), expected);
        assert!(!page.has_more);
    }

    #[tokio::test]
    async fn should_count_offset_in_matches_not_scanned_keys() {
        // given
        let storage = user_storage().await;
        let spec = QuerySpec::new("user", MatchMode::Substring, 1).with_offset(1);

        // when
        let page = execute(&storage, &spec).await.unwrap();

        // then
        assert_eq!(keys(&page), vec!["user:2"]);
        assert!(page.has_more);
    }

    #[tokio::test]
    async fn should_return_empty_page_past_the_end() {
        // given
        let storage = user_storage().await;
        let spec = QuerySpec::new("user:", MatchMode::Prefix, 2).with_offset(50);

        // when
        let page = execute(&storage, &spec).await.unwrap();

        // then
        assert!(page.keys.is_empty());
        assert!(!page.has_more);
    }

    #[tokio::test]
    async fn should_reject_invalid_regex_before_scanning() {
        // given
        let storage = user_storage().await;
        let spec = QuerySpec::new("([", MatchMode::Regex, 10);

        // when
        let result = execute(&storage, &spec).await;

        // then
        assert!(matches!(result, Err(Error::InvalidPattern(_))));
    }

    #[tokio::test]
    async fn should_reject_zero_limit() {
        // given
        let storage = user_storage().await;
        let spec = QuerySpec::new("", MatchMode::Prefix, 0);

        // when
        let result = execute(&storage, &spec).await;

        // then
        assert!(matches!(result, Err(Error::InvalidInput(_))));
    }

    #[rstest]
    #[case(MatchMode::Prefix, "USER:")]
    #[case(MatchMode::Substring, "SER:")]
    #[case(MatchMode::Regex, "^USER:")]
    #[tokio::test]
    async fn should_fold_case_when_insensitive(#[case] mode: MatchMode, #[case] pattern: &str) {
        // given
        let storage = storage_with(&[("User:1", "a"), ("user:2", "b"), ("other", "c")]).await;
        let spec = QuerySpec::new(pattern, mode, 10).with_case_sensitive(false);

        // when
        let page = execute(&storage, &spec).await.unwrap();

        // then
        assert_eq!(keys(&page), vec!["User:1", "user:2"]);
    }

    #[tokio::test]
    async fn should_match_case_sensitively_by_default() {
        // given
        let storage = storage_with(&[("User:1", "a"), ("user:2", "b")]).await;
        let spec = QuerySpec::new("user:", MatchMode::Prefix, 10);

        // when
        let page = execute(&storage, &spec).await.unwrap();

        // then
        assert_eq!(keys(&page), vec!["user:2"]);
    }

    #[tokio::test]
    async fn should_resume_from_inclusive_start_key_and_ignore_offset() {
        // given
        let storage = user_storage().await;
        let asc = QuerySpec::new("user:", MatchMode::Prefix, 10)
            .with_start_key("user:2")
            .with_offset(5);
        let desc = QuerySpec::new("user:", MatchMode::Prefix, 10)
            .with_order(SortOrder::Desc)
            .with_start_key("user:2");

        // when
        let asc_page = execute(&storage, &asc).await.unwrap();
        let desc_page = execute(&storage, &desc).await.unwrap();

        // then
        assert_eq!(keys(&asc_page), vec!["user:2", "user:3"]);
        assert_eq!(keys(&desc_page), vec!["user:2", "user:1"]);
    }

    #[tokio::test]
    async fn should_preview_binary_and_long_values() {
        // given
        let storage = InMemoryStorage::new();
        storage
            .put(vec![
                Record::new(Bytes::from("bin"), Bytes::from_static(b"\x00\x01\x02")).into(),
                Record::new(Bytes::from("txt"), Bytes::from("abcdefghij")).into(),
            ])
            .await
            .unwrap();
        let spec = QuerySpec::new("", MatchMode::Prefix, 10).with_preview_chars(4);

        // when
        let page = execute(&storage, &spec).await.unwrap();

        // then
        assert_eq!(page.keys[0].value_preview, "[Binary 3 bytes]");
        assert_eq!(page.keys[0].size, 3);
        assert_eq!(page.keys[1].value_preview, "abcd...");
        assert_eq!(page.keys[1].size, 10);
    }

    #[tokio::test]
    async fn should_report_expiry_in_unix_seconds() {
        // given
        let storage = InMemoryStorage::new();
        let op = PutRecordOp::new(Record::new(Bytes::from("k"), Bytes::from("v")))
            .with_options(PutOptions {
                ttl: Ttl::from_secs(3600),
            });
        storage.put(vec![op]).await.unwrap();
        let spec = QuerySpec::new("", MatchMode::Prefix, 10);

        // when
        let page = execute(&storage, &spec).await.unwrap();

        // then
        let expires_at = page.keys[0].expires_at;
        let now_secs = std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .unwrap()
            .as_secs();
        assert!(expires_at > now_secs && expires_at <= now_secs + 3600);
    }

    #[tokio::test]
    async fn should_stop_ascending_prefix_scan_at_first_key_past_prefix() {
        // given
        let storage = storage_with(&[("a:1", "x"), ("b:1", "x"), ("b:2", "x"), ("c:1", "x")]).await;
        let spec = QuerySpec::new("b:", MatchMode::Prefix, 10);

        // when
        let page = execute(&storage, &spec).await.unwrap();

        // then
        assert_eq!(keys(&page), vec!["b:1", "b:2"]);
        assert!(!page.has_more);
    }

    #[test]
    fn should_bound_range_only_for_case_sensitive_prefix() {
        // given
        let cs = QuerySpec::new("b", MatchMode::Prefix, 1);
        let ci = QuerySpec::new("b", MatchMode::Prefix, 1).with_case_sensitive(false);
        let sub = QuerySpec::new("b", MatchMode::Substring, 1);

        // when
        let cs_range = scan_range(&cs, &Matcher::new(&cs).unwrap());
        let ci_range = scan_range(&ci, &Matcher::new(&ci).unwrap());
        let sub_range = scan_range(&sub, &Matcher::new(&sub).unwrap());

        // then
        assert_eq!(cs_range, BytesRange::starting_at(Bytes::from("b")));
        assert_eq!(ci_range, BytesRange::unbounded());
        assert_eq!(sub_range, BytesRange::unbounded());
    }

    mod proptests {
        use std::collections::BTreeSet;

        use proptest::prelude::*;

        use super::*;

        fn run<F: std::future::Future>(fut: F) -> F::Output {
            tokio::runtime::Builder::new_current_thread()
                .build()
                .unwrap()
                .block_on(fut)
        }

        async fn collect_pages(
            storage: &InMemoryStorage,
            base: &QuerySpec,
            page_size: usize,
        ) -> Vec<String> {
            let mut seen = Vec::new();
            let mut offset = 0;
            loop {
                let spec = base.clone().with_offset(offset);
                let page = execute(storage, &spec).await.unwrap();
                assert!(page.keys.len() <= page_size);
                if page.has_more {
                    assert_eq!(page.keys.len(), page_size);
                }
                offset += page.keys.len();
                seen.extend(page.keys.into_iter().map(|k| k.key));
                if !page.has_more {
                    return seen;
                }
            }
        }

        proptest! {
            /// Paging through a query with offsets visits exactly the
            /// matching keys, in order, each once, whatever the match mode.
            #[test]
            fn pages_cover_all_matches_in_order(
                keys in prop::collection::btree_set("[a-c]{1,4}", 0..40),
                fragment in "[a-c]{0,2}",
                mode in prop_oneof![
                    Just(MatchMode::Prefix),
                    Just(MatchMode::Substring),
                    Just(MatchMode::Regex),
                ],
                page_size in 1usize..7,
                descending in any::<bool>(),
            ) {
                let entries: Vec<(String, String)> =
                    keys.iter().map(|k| (k.clone(), "v".to_string())).collect();
                let order = if descending { SortOrder::Desc } else { SortOrder::Asc };
                // Regex mode anchors at the end so it selects a different set
                // than the other two modes.
                let pattern = match mode {
                    MatchMode::Regex => format!("{}$", regex::escape(&fragment)),
                    _ => fragment.clone(),
                };
                let pattern_re = Regex::new(&pattern).unwrap();
                let is_match = |k: &str| match mode {
                    MatchMode::Prefix => k.starts_with(fragment.as_str()),
                    MatchMode::Substring => k.contains(fragment.as_str()),
                    MatchMode::Regex => pattern_re.is_match(k),
                };

                let seen = run(async {
                    let storage = InMemoryStorage::new();
                    let records: Vec<PutRecordOp> = entries
                        .iter()
                        .map(|(k, v)| Record::new(Bytes::from(k.clone()), Bytes::from(v.clone())).into())
                        .collect();
                    storage.put(records).await.unwrap();
                    let base = QuerySpec::new(pattern.clone(), mode, page_size)
                        .with_order(order);
                    collect_pages(&storage, &base, page_size).await
                });

                let mut expected: Vec<String> = keys
                    .iter()
                    .filter(|k| is_match(k))
                    .cloned()
                    .collect();
                if descending {
                    expected.reverse();
                }
                prop_assert_eq!(seen, expected);
            }

            /// Case-insensitive prefix scans agree with a lowercase filter.
            #[test]
            fn case_insensitive_prefix_matches_lowercased_filter(
                keys in prop::collection::btree_set("[aAbB]{1,3}", 0..20),
                prefix in "[aAbB]{1,2}",
            ) {
                let seen = run(async {
                    let storage = InMemoryStorage::new();
                    let records: Vec<PutRecordOp> = keys
                        .iter()
                        .map(|k| Record::new(Bytes::from(k.clone()), Bytes::new()).into())
                        .collect();
                    storage.put(records).await.unwrap();
                    let spec = QuerySpec::new(prefix.clone(), MatchMode::Prefix, 100)
                        .with_case_sensitive(false);
                    execute(&storage, &spec).await.unwrap()
                });

                let expected: BTreeSet<String> = keys
                    .iter()
                    .filter(|k| k.to_lowercase().starts_with(&prefix.to_lowercase()))
                    .cloned()
                    .collect();
                let got: BTreeSet<String> = seen.keys.into_iter().map(|k| k.key).collect();
                prop_assert_eq!(got, expected);
            }
        }
    }

    #[tokio::test]
    async fn should_query_through_shared_storage_handle() {
        // given
        let storage: Arc<dyn Storage> = Arc::new(user_storage().await);
        let spec = QuerySpec::new("zeta", MatchMode::Prefix, 1);

        // when
        let page = execute(storage.as_ref(), &spec).await.unwrap();

        // then
        assert_eq!(keys(&page), vec!["zeta"]);
        assert!(!page.has_more);
    }
}
