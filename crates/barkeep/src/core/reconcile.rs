//! Merging changes into a mirrored collection.
//!
//! Both the result of a local call and the echo of that same write arriving on the
//! change stream pass through [`reconcile`]. Applying a change a second time is a no-op,
//! so the two can arrive in either order.

use barkeep_api::Change;
use barkeep_core::Entity;

use crate::core::view::View;

/// Apply `change` to `rows`, the current contents of `view`.
///
/// Returns whether `rows` was modified.
pub fn reconcile<E: Entity>(rows: &mut Vec<E>, view: &View<E>, change: Change<E>) -> bool {
    match change {
        Change::Created { data, .. } => insert(rows, view, data),
        Change::Updated { id, data, .. } => {
            let position = rows.iter().position(|r| r.id() == id);
            match (position, view.matches(&data)) {
                (Some(i), true) => {
                    if rows[i] == data {
                        false
                    } else {
                        rows[i] = data;
                        true
                    }
                }
                (Some(i), false) => {
                    rows.remove(i);
                    true
                }
                (None, true) if view.is_filtered() => insert(rows, view, data),
                (None, _) => false,
            }
        }
        Change::Deleted { id, .. } => {
            let before = rows.len();
            rows.retain(|r| r.id() != id);
            rows.len() != before
        }
    }
}

fn insert<E: Entity>(rows: &mut Vec<E>, view: &View<E>, row: E) -> bool {
    if !view.matches(&row) || rows.iter().any(|r| r.id() == row.id()) {
        return false;
    }
    let index = view.insertion_index(rows, &row);
    if view.limit().is_some_and(|limit| index >= limit) {
        return false;
    }
    rows.insert(index, row);
    if let Some(limit) = view.limit() {
        rows.truncate(limit);
    }
    true
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{Drink, Order, OrderStatus, Premix};
    use barkeep_api::{ChangeOrigin, RowId};
    use proptest::prelude::*;

    fn drink(id: i64, name: &str) -> Drink {
        Drink {
            id: RowId(id),
            name: name.to_string(),
            ingredients: "gin".into(),
            preparation: "stir".into(),
            image: None,
        }
    }

    fn premix(id: i64, ready: bool) -> Premix {
        Premix {
            id: RowId(id),
            name: format!("premix {}", id),
            ingredients: "sugar".into(),
            preparation: "heat".into(),
            image: None,
            ready,
        }
    }

    fn order(id: i64) -> Order {
        Order {
            id: RowId(id),
            name: format!("Order - {}", id),
            products: vec!["Gin".into()],
            status: OrderStatus::Pending,
        }
    }

    fn created<E>(data: E) -> Change<E> {
        Change::Created {
            data,
            origin: ChangeOrigin::Remote,
        }
    }

    fn updated<E: Entity>(data: E) -> Change<E> {
        Change::Updated {
            id: data.id(),
            data,
            origin: ChangeOrigin::Remote,
        }
    }

    fn ids<E: Entity>(rows: &[E]) -> Vec<i64> {
        rows.iter().map(|r| r.id().0).collect()
    }

    #[test]
    fn duplicate_insert_keeps_one_row() {
        let view = View::<Drink>::drinks();
        let mut rows = vec![];
        assert!(reconcile(&mut rows, &view, created(drink(1, "Negroni"))));
        assert!(!reconcile(&mut rows, &view, created(drink(1, "Negroni"))));
        assert_eq!(ids(&rows), vec![1]);
    }

    #[test]
    fn update_of_absent_row_is_ignored_in_unfiltered_view() {
        let view = View::<Drink>::drinks();
        let mut rows = vec![drink(1, "a")];
        assert!(!reconcile(&mut rows, &view, updated(drink(2, "b"))));
        assert!(reconcile(&mut rows, &view, updated(drink(1, "c"))));
        assert_eq!(rows[0].name, "c");
    }

    #[test]
    fn delete_removes_matching_row_only() {
        let view = View::<Drink>::drinks();
        let mut rows = vec![drink(1, "a"), drink(2, "b")];
        let change = Change::Deleted {
            id: RowId(1),
            origin: ChangeOrigin::Local,
        };
        assert!(reconcile(&mut rows, &view, change.clone()));
        assert!(!reconcile(&mut rows, &view, change));
        assert_eq!(ids(&rows), vec![2]);
    }

    #[test]
    fn pending_view_drops_ready_premix_and_restores_it() {
        let view = View::<Premix>::pending_premixes();
        let mut rows = vec![premix(1, false), premix(2, false)];

        assert!(reconcile(&mut rows, &view, updated(premix(1, true))));
        assert_eq!(ids(&rows), vec![2]);

        assert!(reconcile(&mut rows, &view, updated(premix(1, false))));
        assert_eq!(ids(&rows), vec![1, 2]);
    }

    #[test]
    fn pending_view_ignores_ready_inserts() {
        let view = View::<Premix>::pending_premixes();
        let mut rows = vec![];
        assert!(!reconcile(&mut rows, &view, created(premix(1, true))));
        assert!(rows.is_empty());
    }

    #[test]
    fn recent_orders_prepend_and_stay_within_limit() {
        let view = View::<Order>::recent_orders(2);
        let mut rows = vec![order(2), order(1)];

        assert!(reconcile(&mut rows, &view, created(order(3))));
        assert_eq!(ids(&rows), vec![3, 2]);

        // older than everything shown and the view is full
        assert!(!reconcile(&mut rows, &view, created(order(1))));
        assert_eq!(ids(&rows), vec![3, 2]);
    }

    #[derive(Debug, Clone)]
    enum Step {
        Create(i64, bool),
        Update(i64, bool),
        Delete(i64),
    }

    fn step() -> impl Strategy<Value = Step> {
        prop_oneof![
            (1i64..6, any::<bool>()).prop_map(|(id, ready)| Step::Create(id, ready)),
            (1i64..6, any::<bool>()).prop_map(|(id, ready)| Step::Update(id, ready)),
            (1i64..6).prop_map(Step::Delete),
        ]
    }

    fn to_change(step: &Step) -> Change<Premix> {
        match step {
            Step::Create(id, ready) => created(premix(*id, *ready)),
            Step::Update(id, ready) => updated(premix(*id, *ready)),
            Step::Delete(id) => Change::Deleted {
                id: RowId(*id),
                origin: ChangeOrigin::Remote,
            },
        }
    }

    proptest! {
        #[test]
        fn delivering_every_change_twice_changes_nothing(steps in prop::collection::vec(step(), 0..40)) {
            for view in [View::<Premix>::premixes(), View::<Premix>::pending_premixes()] {
                let mut once = vec![];
                let mut twice = vec![];
                for step in &steps {
                    reconcile(&mut once, &view, to_change(step));
                    reconcile(&mut twice, &view, to_change(step));
                    reconcile(&mut twice, &view, to_change(step));
                }
                prop_assert_eq!(&once, &twice);

                let mut seen = ids(&once);
                seen.dedup();
                prop_assert_eq!(seen.len(), once.len());
                prop_assert!(once.iter().all(|p| view.matches(p)));
            }
        }
    }
}
