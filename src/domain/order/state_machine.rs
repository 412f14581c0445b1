use std::fmt;

use chrono::{DateTime, Utc};
use serde::Serialize;
use uuid::Uuid;

use super::aggregate::Order;
use super::commands::BudgetLine;
use super::errors::OrderError;
use super::value_objects::OrderStatus;

// ============================================================================
// Order Status Machine
// ============================================================================
//
// Every legal (source, event) pair is one row of TRANSITIONS together with
// its guard and status side effect. Anything not in the table is rejected
// with InvalidTransition before any mutation happens.
//
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum WorkflowEvent {
    SubmitForReview,
    SubmitBudget,
    ApproveBudget,
    CompleteWork,
    MarkReadyForDelivery,
    Deliver,
    AdministrativeUpdate,
}

impl WorkflowEvent {
    pub const ALL: [WorkflowEvent; 7] = [
        WorkflowEvent::SubmitForReview,
        WorkflowEvent::SubmitBudget,
        WorkflowEvent::ApproveBudget,
        WorkflowEvent::CompleteWork,
        WorkflowEvent::MarkReadyForDelivery,
        WorkflowEvent::Deliver,
        WorkflowEvent::AdministrativeUpdate,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            WorkflowEvent::SubmitForReview => "submit_for_review",
            WorkflowEvent::SubmitBudget => "submit_budget",
            WorkflowEvent::ApproveBudget => "approve_budget",
            WorkflowEvent::CompleteWork => "complete_work",
            WorkflowEvent::MarkReadyForDelivery => "mark_ready_for_delivery",
            WorkflowEvent::Deliver => "deliver",
            WorkflowEvent::AdministrativeUpdate => "administrative_update",
        }
    }
}

impl fmt::Display for WorkflowEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let text = match self {
            WorkflowEvent::SubmitForReview => "submit for review",
            WorkflowEvent::SubmitBudget => "submit budget",
            WorkflowEvent::ApproveBudget => "approve budget",
            WorkflowEvent::CompleteWork => "complete work",
            WorkflowEvent::MarkReadyForDelivery => "mark ready for delivery",
            WorkflowEvent::Deliver => "deliver",
            WorkflowEvent::AdministrativeUpdate => "update order",
        };
        f.write_str(text)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Source {
    Exactly(OrderStatus),
    AnyNonTerminal,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Target {
    Status(OrderStatus),
    Unchanged,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Guard {
    Always,
    HasItems,
    BudgetOnReceivedItems,
    AuthorizedServicesInOrder,
    CompletedServicesAuthorized,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StatusEffect {
    None,
    StampActualCompletion,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Transition {
    pub event: WorkflowEvent,
    pub source: Source,
    pub target: Target,
    pub guard: Guard,
    pub effect: StatusEffect,
}

impl Transition {
    fn matches(&self, status: OrderStatus, event: WorkflowEvent) -> bool {
        self.event == event
            && match self.source {
                Source::Exactly(from) => from == status,
                Source::AnyNonTerminal => !status.is_terminal(),
            }
    }
}

const fn row(
    event: WorkflowEvent,
    source: Source,
    target: Target,
    guard: Guard,
    effect: StatusEffect,
) -> Transition {
    Transition {
        event,
        source,
        target,
        guard,
        effect,
    }
}

use OrderStatus as S;
use WorkflowEvent as E;

pub static TRANSITIONS: [Transition; 8] = [
    row(
        E::SubmitForReview,
        Source::Exactly(S::Open),
        Target::Status(S::AwaitingReview),
        Guard::HasItems,
        StatusEffect::None,
    ),
    row(
        E::SubmitBudget,
        Source::Exactly(S::AwaitingReview),
        Target::Status(S::AwaitingCustomerApproval),
        Guard::BudgetOnReceivedItems,
        StatusEffect::None,
    ),
    row(
        E::ApproveBudget,
        Source::Exactly(S::AwaitingCustomerApproval),
        Target::Status(S::ReadyForWork),
        Guard::AuthorizedServicesInOrder,
        StatusEffect::None,
    ),
    row(
        E::CompleteWork,
        Source::Exactly(S::ReadyForWork),
        Target::Status(S::InProgress),
        Guard::CompletedServicesAuthorized,
        StatusEffect::None,
    ),
    row(
        E::CompleteWork,
        Source::Exactly(S::InProgress),
        Target::Unchanged,
        Guard::CompletedServicesAuthorized,
        StatusEffect::None,
    ),
    row(
        E::MarkReadyForDelivery,
        Source::Exactly(S::InProgress),
        Target::Status(S::ReadyForDelivery),
        Guard::Always,
        StatusEffect::None,
    ),
    row(
        E::Deliver,
        Source::Exactly(S::ReadyForDelivery),
        Target::Status(S::Delivered),
        Guard::Always,
        StatusEffect::StampActualCompletion,
    ),
    row(
        E::AdministrativeUpdate,
        Source::AnyNonTerminal,
        Target::Unchanged,
        Guard::Always,
        StatusEffect::None,
    ),
];

/// Why a transition was refused. The `Display` form names the guard.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum GuardFailure {
    #[error("no transition is defined from this status")]
    WrongSourceState,
    #[error("order is in a terminal status")]
    TerminalStatus,
    #[error("order must have at least one item")]
    NoItems,
    #[error("at least one item must be received")]
    NoItemReceived,
    #[error("budget must contain at least one service")]
    EmptyBudget,
    #[error("budget item {0} does not belong to this order")]
    ItemNotInOrder(Uuid),
    #[error("budget item {0} has not been received")]
    ItemNotReceived(Uuid),
    #[error("at least one authorized service id is required")]
    NoAuthorizedServices,
    #[error("service {0} does not belong to this order")]
    ServiceNotInOrder(Uuid),
    #[error("service {0} has not been budgeted")]
    ServiceNotBudgeted(Uuid),
    #[error("service {0} has not been authorized")]
    ServiceNotAuthorized(Uuid),
}

/// A requested event together with the payload its guard inspects.
#[derive(Debug, Clone, Copy)]
pub enum TransitionRequest<'a> {
    SubmitForReview,
    SubmitBudget(&'a [BudgetLine]),
    ApproveBudget(&'a [Uuid]),
    CompleteWork(&'a [Uuid]),
    MarkReadyForDelivery,
    Deliver,
    AdministrativeUpdate,
}

impl TransitionRequest<'_> {
    pub fn event(&self) -> WorkflowEvent {
        match self {
            TransitionRequest::SubmitForReview => WorkflowEvent::SubmitForReview,
            TransitionRequest::SubmitBudget(_) => WorkflowEvent::SubmitBudget,
            TransitionRequest::ApproveBudget(_) => WorkflowEvent::ApproveBudget,
            TransitionRequest::CompleteWork(_) => WorkflowEvent::CompleteWork,
            TransitionRequest::MarkReadyForDelivery => WorkflowEvent::MarkReadyForDelivery,
            TransitionRequest::Deliver => WorkflowEvent::Deliver,
            TransitionRequest::AdministrativeUpdate => WorkflowEvent::AdministrativeUpdate,
        }
    }

    fn budget_lines(&self) -> &[BudgetLine] {
        match self {
            TransitionRequest::SubmitBudget(lines) => lines,
            _ => &[],
        }
    }

    fn service_ids(&self) -> &[Uuid] {
        match self {
            TransitionRequest::ApproveBudget(ids) | TransitionRequest::CompleteWork(ids) => ids,
            _ => &[],
        }
    }
}

impl Guard {
    pub fn check(&self, order: &Order, request: &TransitionRequest<'_>) -> Result<(), GuardFailure> {
        match self {
            Guard::Always => Ok(()),

            Guard::HasItems => {
                if order.items.is_empty() {
                    return Err(GuardFailure::NoItems);
                }
                Ok(())
            }

            Guard::BudgetOnReceivedItems => {
                let lines = request.budget_lines();
                if lines.is_empty() {
                    return Err(GuardFailure::EmptyBudget);
                }
                for line in lines {
                    let item = order
                        .find_item(line.order_item_id)
                        .ok_or(GuardFailure::ItemNotInOrder(line.order_item_id))?;
                    if !item.received {
                        return Err(GuardFailure::ItemNotReceived(item.id));
                    }
                }
                Ok(())
            }

            Guard::AuthorizedServicesInOrder => {
                let ids = request.service_ids();
                if ids.is_empty() {
                    return Err(GuardFailure::NoAuthorizedServices);
                }
                for id in ids {
                    let service = order
                        .find_service(*id)
                        .ok_or(GuardFailure::ServiceNotInOrder(*id))?;
                    if !service.budgeted {
                        return Err(GuardFailure::ServiceNotBudgeted(*id));
                    }
                }
                Ok(())
            }

            Guard::CompletedServicesAuthorized => {
                for id in request.service_ids() {
                    let service = order
                        .find_service(*id)
                        .ok_or(GuardFailure::ServiceNotInOrder(*id))?;
                    if !service.authorized {
                        return Err(GuardFailure::ServiceNotAuthorized(*id));
                    }
                }
                Ok(())
            }
        }
    }
}

/// The outcome of a successful guard check, applied after the caller has
/// made its entity mutations.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TransitionPlan {
    pub event: WorkflowEvent,
    pub from: OrderStatus,
    pub to: OrderStatus,
    effect: StatusEffect,
}

impl TransitionPlan {
    pub fn changes_status(&self) -> bool {
        self.from != self.to
    }

    /// Refuse the planned transition after the caller's mutations, for
    /// conditions that depend on what those mutations produced.
    pub fn reject(&self, guard: GuardFailure) -> OrderError {
        OrderError::InvalidTransition {
            from: self.from,
            event: self.event,
            guard,
        }
    }

    pub fn apply(&self, order: &mut Order, now: DateTime<Utc>) {
        order.status = self.to;
        if self.effect == StatusEffect::StampActualCompletion {
            order.actual_completion = Some(now);
        }
    }
}

pub struct OrderStatusMachine;

impl OrderStatusMachine {
    pub fn transitions() -> &'static [Transition] {
        &TRANSITIONS
    }

    pub fn find(status: OrderStatus, event: WorkflowEvent) -> Option<&'static Transition> {
        TRANSITIONS.iter().find(|t| t.matches(status, event))
    }

    /// Check that `request` is legal for the order's current status and that
    /// its guard holds. Never mutates the order.
    pub fn plan(order: &Order, request: &TransitionRequest<'_>) -> Result<TransitionPlan, OrderError> {
        let event = request.event();
        let reject = |guard: GuardFailure| OrderError::InvalidTransition {
            from: order.status,
            event,
            guard,
        };

        let transition = match Self::find(order.status, event) {
            Some(t) => t,
            None if order.status.is_terminal() => return Err(reject(GuardFailure::TerminalStatus)),
            None => return Err(reject(GuardFailure::WrongSourceState)),
        };

        transition.guard.check(order, request).map_err(reject)?;

        let to = match transition.target {
            Target::Status(status) => status,
            Target::Unchanged => order.status,
        };

        Ok(TransitionPlan {
            event,
            from: order.status,
            to,
            effect: transition.effect,
        })
    }

    /// Administrative status override. The caller has already planned an
    /// `AdministrativeUpdate`, so the order is not terminal.
    ///
    /// `actual_completion` is present exactly while the status is a success
    /// state: stamped on the way in, cleared on the way out.
    pub fn override_status(order: &mut Order, target: OrderStatus, now: DateTime<Utc>) {
        if order.status == target {
            return;
        }
        order.status = target;
        if !target.is_success() {
            order.actual_completion = None;
        } else if order.actual_completion.is_none() {
            order.actual_completion = Some(now);
        }
    }
}

// ============================================================================
// Unit Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::order::aggregate::tests::{sample_command, service};

    fn order_in(status: OrderStatus) -> Order {
        let mut order = Order::open(&sample_command(), Uuid::new_v4(), Utc::now());
        order.status = status;
        order
    }

    /// An order in `status` whose data satisfies every guard, plus requests
    /// that satisfy them.
    struct Fixture {
        order: Order,
        lines: Vec<BudgetLine>,
        authorized: Vec<Uuid>,
        budgeted: Vec<Uuid>,
    }

    fn fixture(status: OrderStatus) -> Fixture {
        let mut order = order_in(status);
        order.mark_received(&[], &[]).unwrap();
        let item_id = order.items[0].id;

        let budgeted = service("boring", 100);
        let mut authorized = service("honing", 50);
        authorized.authorized = true;
        let ids = (budgeted.id, authorized.id);
        order.add_budgeted_service(item_id, budgeted).unwrap();
        order.add_budgeted_service(item_id, authorized).unwrap();

        Fixture {
            order,
            lines: vec![BudgetLine {
                order_item_id: item_id,
                service_key: "boring".to_string(),
                measurement: None,
            }],
            authorized: vec![ids.1],
            budgeted: vec![ids.0],
        }
    }

    fn satisfying_request<'a>(event: WorkflowEvent, f: &'a Fixture) -> TransitionRequest<'a> {
        match event {
            E::SubmitForReview => TransitionRequest::SubmitForReview,
            E::SubmitBudget => TransitionRequest::SubmitBudget(&f.lines),
            E::ApproveBudget => TransitionRequest::ApproveBudget(&f.budgeted),
            E::CompleteWork => TransitionRequest::CompleteWork(&f.authorized),
            E::MarkReadyForDelivery => TransitionRequest::MarkReadyForDelivery,
            E::Deliver => TransitionRequest::Deliver,
            E::AdministrativeUpdate => TransitionRequest::AdministrativeUpdate,
        }
    }

    #[test]
    fn test_every_state_event_pair_follows_the_table() {
        for status in OrderStatus::ALL {
            for event in WorkflowEvent::ALL {
                let f = fixture(status);
                let request = satisfying_request(event, &f);
                let result = OrderStatusMachine::plan(&f.order, &request);

                match OrderStatusMachine::find(status, event) {
                    Some(transition) => {
                        let plan = result.unwrap_or_else(|e| {
                            panic!("{status:?} + {event:?} should be legal: {e}")
                        });
                        let expected = match transition.target {
                            Target::Status(to) => to,
                            Target::Unchanged => status,
                        };
                        assert_eq!(plan.to, expected);
                    }
                    None => {
                        assert!(
                            matches!(result, Err(OrderError::InvalidTransition { from, .. }) if from == status),
                            "{status:?} + {event:?} should be rejected"
                        );
                    }
                }
            }
        }
    }

    #[test]
    fn test_terminal_states_reject_every_event() {
        for status in OrderStatus::ALL.into_iter().filter(|s| s.is_terminal()) {
            for event in WorkflowEvent::ALL {
                assert!(OrderStatusMachine::find(status, event).is_none());
            }
            let f = fixture(status);
            let err = OrderStatusMachine::plan(&f.order, &TransitionRequest::AdministrativeUpdate)
                .unwrap_err();
            assert!(matches!(
                err,
                OrderError::InvalidTransition { guard: GuardFailure::TerminalStatus, .. }
            ));
        }
    }

    #[test]
    fn test_happy_path_targets() {
        let cases = [
            (S::Open, E::SubmitForReview, S::AwaitingReview),
            (S::AwaitingReview, E::SubmitBudget, S::AwaitingCustomerApproval),
            (S::AwaitingCustomerApproval, E::ApproveBudget, S::ReadyForWork),
            (S::ReadyForWork, E::CompleteWork, S::InProgress),
            (S::InProgress, E::MarkReadyForDelivery, S::ReadyForDelivery),
            (S::ReadyForDelivery, E::Deliver, S::Delivered),
        ];
        for (from, event, to) in cases {
            let f = fixture(from);
            let plan = OrderStatusMachine::plan(&f.order, &satisfying_request(event, &f)).unwrap();
            assert_eq!(plan.from, from);
            assert_eq!(plan.to, to);
            assert!(plan.changes_status());
        }
    }

    #[test]
    fn test_submit_for_review_requires_items() {
        let mut order = order_in(S::Open);
        order.items.clear();

        let err = OrderStatusMachine::plan(&order, &TransitionRequest::SubmitForReview).unwrap_err();
        assert!(matches!(err, OrderError::InvalidTransition { guard: GuardFailure::NoItems, .. }));
    }

    #[test]
    fn test_budget_on_open_order_is_rejected() {
        let f = fixture(S::Open);
        let err = OrderStatusMachine::plan(&f.order, &TransitionRequest::SubmitBudget(&f.lines))
            .unwrap_err();

        assert!(matches!(
            err,
            OrderError::InvalidTransition { from: S::Open, event: E::SubmitBudget, guard: GuardFailure::WrongSourceState }
        ));
    }

    #[test]
    fn test_budget_guards() {
        let mut order = order_in(S::AwaitingReview);
        let item_id = order.items[0].id;

        let err = OrderStatusMachine::plan(&order, &TransitionRequest::SubmitBudget(&[])).unwrap_err();
        assert!(matches!(err, OrderError::InvalidTransition { guard: GuardFailure::EmptyBudget, .. }));

        let lines = vec![BudgetLine {
            order_item_id: item_id,
            service_key: "boring".to_string(),
            measurement: None,
        }];
        let err = OrderStatusMachine::plan(&order, &TransitionRequest::SubmitBudget(&lines)).unwrap_err();
        assert!(matches!(
            err,
            OrderError::InvalidTransition { guard: GuardFailure::ItemNotReceived(id), .. } if id == item_id
        ));

        let stranger = vec![BudgetLine {
            order_item_id: Uuid::new_v4(),
            ..lines[0].clone()
        }];
        let err = OrderStatusMachine::plan(&order, &TransitionRequest::SubmitBudget(&stranger)).unwrap_err();
        assert!(matches!(err, OrderError::InvalidTransition { guard: GuardFailure::ItemNotInOrder(_), .. }));

        order.mark_received(&[item_id], &[]).unwrap();
        assert!(OrderStatusMachine::plan(&order, &TransitionRequest::SubmitBudget(&lines)).is_ok());
    }

    #[test]
    fn test_approval_guards() {
        let f = fixture(S::AwaitingCustomerApproval);

        let err = OrderStatusMachine::plan(&f.order, &TransitionRequest::ApproveBudget(&[])).unwrap_err();
        assert!(matches!(err, OrderError::InvalidTransition { guard: GuardFailure::NoAuthorizedServices, .. }));

        let foreign = [Uuid::new_v4()];
        let err = OrderStatusMachine::plan(&f.order, &TransitionRequest::ApproveBudget(&foreign)).unwrap_err();
        assert!(matches!(err, OrderError::InvalidTransition { guard: GuardFailure::ServiceNotInOrder(_), .. }));
    }

    #[test]
    fn test_approving_an_unbudgeted_service_names_the_budget_guard() {
        let mut f = fixture(S::AwaitingCustomerApproval);
        let item_id = f.order.items[0].id;
        let mut withdrawn = service("facing", 20);
        withdrawn.budgeted = false;
        let withdrawn_id = withdrawn.id;
        f.order.add_budgeted_service(item_id, withdrawn).unwrap();

        let ids = [withdrawn_id];
        let err = OrderStatusMachine::plan(&f.order, &TransitionRequest::ApproveBudget(&ids)).unwrap_err();
        assert!(matches!(
            err,
            OrderError::InvalidTransition { guard: GuardFailure::ServiceNotBudgeted(id), .. } if id == withdrawn_id
        ));
    }

    #[test]
    fn test_completion_requires_authorization() {
        let f = fixture(S::ReadyForWork);
        let err = OrderStatusMachine::plan(&f.order, &TransitionRequest::CompleteWork(&f.budgeted))
            .unwrap_err();

        assert!(matches!(err, OrderError::InvalidTransition { guard: GuardFailure::ServiceNotAuthorized(_), .. }));
    }

    #[test]
    fn test_further_completion_keeps_in_progress() {
        let f = fixture(S::InProgress);
        let plan = OrderStatusMachine::plan(&f.order, &TransitionRequest::CompleteWork(&f.authorized))
            .unwrap();

        assert_eq!(plan.to, S::InProgress);
        assert!(!plan.changes_status());
    }

    #[test]
    fn test_deliver_stamps_actual_completion() {
        let mut order = order_in(S::ReadyForDelivery);
        let now = Utc::now();
        let plan = OrderStatusMachine::plan(&order, &TransitionRequest::Deliver).unwrap();
        plan.apply(&mut order, now);

        assert_eq!(order.status, S::Delivered);
        assert_eq!(order.actual_completion, Some(now));
    }

    #[test]
    fn test_non_delivering_transitions_leave_actual_completion_unset() {
        let mut order = order_in(S::InProgress);
        let plan = OrderStatusMachine::plan(&order, &TransitionRequest::MarkReadyForDelivery).unwrap();
        plan.apply(&mut order, Utc::now());

        assert_eq!(order.status, S::ReadyForDelivery);
        assert!(order.actual_completion.is_none());
    }

    #[test]
    fn test_override_status() {
        let mut order = order_in(S::Open);
        let now = Utc::now();

        OrderStatusMachine::override_status(&mut order, S::InProgress, now);
        assert_eq!(order.status, S::InProgress);
        assert!(order.actual_completion.is_none());

        OrderStatusMachine::override_status(&mut order, S::Completed, now);
        assert_eq!(order.actual_completion, Some(now));
    }

    #[test]
    fn test_override_out_of_success_clears_actual_completion() {
        let mut order = order_in(S::Open);
        let now = Utc::now();

        OrderStatusMachine::override_status(&mut order, S::Completed, now);
        assert_eq!(order.actual_completion, Some(now));

        OrderStatusMachine::override_status(&mut order, S::InProgress, now);
        assert_eq!(order.status, S::InProgress);
        assert!(order.actual_completion.is_none());
    }
}
