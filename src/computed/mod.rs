//! Derived stores
//!
//! A computed store re-derives its value from one or more source stores via
//! a pure mapping function, pushed through the base store's
//! equality-suppressed `set` so downstream listeners only wake on real
//! changes. Derivation is suppressed while any source is unready: the
//! mapping never sees a placeholder value.
//!
//! Sources are not owned. The wiring holds only weak handles, so a computed
//! store neither keeps its sources alive nor is kept alive by them; once
//! every strong handle to a source is gone the derived store stops
//! updating from it.
//!
//! The mapping is assumed total for ready inputs. A panic inside it
//! propagates to whichever `set` call triggered the derivation.

use std::sync::Arc;

use crate::store::{KeyScope, Store, WeakStore, store};
use crate::value::Json;

/// Derive a store from a single source.
pub fn computed<F>(source: &Store, mapping: F) -> Store
where
    F: Fn(&Json) -> Json + Send + Sync + 'static,
{
    computed_keys(source, mapping, KeyScope::Any)
}

/// Derive a store from a single source, re-deriving only when the scoped
/// keys change.
pub fn computed_keys<F>(source: &Store, mapping: F, scope: KeyScope) -> Store
where
    F: Fn(&Json) -> Json + Send + Sync + 'static,
{
    let derived = match source.get() {
        Some(value) => store(mapping(&value)),
        None => Store::unready(),
    };

    let out = derived.downgrade();
    // Subscription handles are deliberately dropped: unsubscribe is explicit
    // and the listener no-ops once the derived store is gone.
    let _ = source.listen_keys(
        move |value| {
            let Some(out) = out.upgrade() else { return };
            match value {
                Some(value) => out.set(mapping(value)),
                None => out.unset(),
            }
        },
        scope,
    );

    derived
}

/// Derive a store from several sources (fan-in).
///
/// The mapping receives the sources' values in the order they were given.
/// Whenever any source notifies, every source is read fresh, so the result
/// always reflects the latest snapshot of all of them.
pub fn computed_all<F>(sources: &[Store], mapping: F) -> Store
where
    F: Fn(&[Json]) -> Json + Send + Sync + 'static,
{
    computed_all_keys(sources, mapping, KeyScope::Any)
}

/// Fan-in derivation with a key scope forwarded to every source
/// subscription.
pub fn computed_all_keys<F>(sources: &[Store], mapping: F, scope: KeyScope) -> Store
where
    F: Fn(&[Json]) -> Json + Send + Sync + 'static,
{
    let derived = match snapshot(sources.iter().map(Store::get)) {
        Some(values) => store(mapping(&values)),
        None => Store::unready(),
    };

    let mapping = Arc::new(mapping);
    let weak_sources: Vec<WeakStore> = sources.iter().map(Store::downgrade).collect();

    for source in sources {
        let out = derived.downgrade();
        let mapping = mapping.clone();
        let weak_sources = weak_sources.clone();

        let _ = source.listen_keys(
            move |_| {
                let Some(out) = out.upgrade() else { return };
                let values = weak_sources
                    .iter()
                    .map(|source| source.upgrade().and_then(|source| source.get()))
                    .collect::<Vec<_>>();
                match snapshot(values) {
                    Some(values) => out.set(mapping(&values)),
                    None => out.unset(),
                }
            },
            scope.clone(),
        );
    }

    derived
}

/// All values, or `None` as soon as any slot is unready.
fn snapshot(values: impl IntoIterator<Item = Option<Json>>) -> Option<Vec<Json>> {
    values.into_iter().collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[test]
    fn single_source_derivation() {
        let celsius = store(json!(20));
        let fahrenheit = computed(&celsius, |c| {
            json!(c.as_f64().unwrap_or(0.0) * 9.0 / 5.0 + 32.0)
        });

        assert_eq!(fahrenheit.get(), Some(json!(68.0)));

        celsius.set(json!(30));
        assert_eq!(fahrenheit.get(), Some(json!(86.0)));
    }

    #[test]
    fn fan_in_sums_all_sources() {
        let a = store(json!(1));
        let b = store(json!(2));
        let sum = computed_all(&[a.clone(), b.clone()], |values| {
            json!(values.iter().filter_map(Json::as_i64).sum::<i64>())
        });

        assert_eq!(sum.get(), Some(json!(3)));

        a.set(json!(10));
        assert_eq!(sum.get(), Some(json!(12)));

        b.set(json!(5));
        assert_eq!(sum.get(), Some(json!(15)));
    }

    #[test]
    fn fan_in_reads_every_source_fresh() {
        let a = store(json!("a1"));
        let b = store(json!("b1"));
        let joined = computed_all(&[a.clone(), b.clone()], |values| {
            json!(
                values
                    .iter()
                    .filter_map(Json::as_str)
                    .collect::<Vec<_>>()
                    .join("+")
            )
        });

        // Only `a` notifies, but the latest `b` must still be picked up.
        b.set(json!("b2"));
        a.set(json!("a2"));
        assert_eq!(joined.get(), Some(json!("a2+b2")));
    }

    #[test]
    fn unready_source_suppresses_mapping() {
        let pending = Store::unready();
        let calls = Arc::new(AtomicUsize::new(0));
        let seen = calls.clone();
        let derived = computed(&pending, move |value| {
            seen.fetch_add(1, Ordering::SeqCst);
            value.clone()
        });

        assert_eq!(derived.get(), None);
        assert_eq!(calls.load(Ordering::SeqCst), 0);

        pending.set(json!("ready"));
        assert_eq!(derived.get(), Some(json!("ready")));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn fan_in_goes_unready_when_any_source_does() {
        let a = store(json!(1));
        let b = store(json!(2));
        let sum = computed_all(&[a.clone(), b.clone()], |values| {
            json!(values.iter().filter_map(Json::as_i64).sum::<i64>())
        });

        b.unset();
        assert_eq!(sum.get(), None);

        b.set(json!(4));
        assert_eq!(sum.get(), Some(json!(5)));
    }

    #[test]
    fn key_scope_limits_rederivation() {
        let state = store(json!({"x": 1, "y": 1}));
        let calls = Arc::new(AtomicUsize::new(0));
        let seen = calls.clone();
        let xs = computed_keys(
            &state,
            move |value| {
                seen.fetch_add(1, Ordering::SeqCst);
                value["x"].clone()
            },
            KeyScope::Many(vec!["x".into()]),
        );

        let initial = calls.load(Ordering::SeqCst);
        state.set(json!({"x": 1, "y": 2}));
        assert_eq!(calls.load(Ordering::SeqCst), initial);

        state.set(json!({"x": 2, "y": 2}));
        assert_eq!(calls.load(Ordering::SeqCst), initial + 1);
        assert_eq!(xs.get(), Some(json!(2)));
    }

    #[test]
    fn equal_derivations_do_not_renotify_downstream() {
        let source = store(json!(1));
        let parity = computed(&source, |v| json!(v.as_i64().unwrap_or(0) % 2));

        let notified = Arc::new(AtomicUsize::new(0));
        let seen = notified.clone();
        let _sub = parity.listen(move |_| {
            seen.fetch_add(1, Ordering::SeqCst);
        });

        source.set(json!(3));
        assert_eq!(notified.load(Ordering::SeqCst), 0);

        source.set(json!(4));
        assert_eq!(notified.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn chained_computed_stores() {
        let base = store(json!(2));
        let doubled = computed(&base, |v| json!(v.as_i64().unwrap_or(0) * 2));
        let described = computed(&doubled, |v| json!(format!("value is {v}")));

        base.set(json!(21));
        assert_eq!(described.get(), Some(json!("value is 42")));
    }

    #[test]
    fn dropped_source_freezes_derived_value() {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let source = store(json!(1));
        let sink = seen.clone();
        let derived = computed(&source, move |v| {
            sink.lock().unwrap().push(v.clone());
            v.clone()
        });

        drop(source);
        assert_eq!(derived.get(), Some(json!(1)));
        assert_eq!(seen.lock().unwrap().len(), 1);
    }
}
