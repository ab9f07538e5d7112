//! Deposit Workflow
//!
//! Headless state machine behind the deposit dialog. A front-end edits the
//! form, submits it, confirms, and then observes the workflow through
//! [`DepositWorkflow::subscribe`] while a background poller follows the
//! payment intent:
//!
//! ```text
//! form --submit--> confirm --confirm--> waiting --success--> success
//!  ^                  |                    |                    |
//!  +------back--------+                    +--failure--> error  |
//!  +--------------------- close / done / try again -------------+
//! ```
//!
//! State shared with the poll task lives in a mutex-guarded cell. Every
//! stop or reset bumps the cell's generation, and a result tagged with an
//! older generation is discarded.

use std::sync::{Arc, Mutex, MutexGuard};
use tokio::sync::watch;

use super::poller::StatusPoller;
use super::types::{
    target_label, DepositForm, DepositSummary, WorkflowConfig, WorkflowSnapshot, WorkflowState,
};
use super::validation::{validate, ValidDeposit, ValidationErrors};
use crate::api::{Account, ApiError, DepositGateway, IntentStatus};
use crate::common::logging::log_deposit_event;
use crate::common::{Result, Vault5Error};

const INITIATE_FAILED: &str = "Failed to initiate deposit";
const CONFIRM_FAILED: &str = "Failed to confirm deposit";
const SETTLING_MESSAGE: &str = "Payment received. Allocating funds...";
const SUCCESS_MESSAGE: &str = "Deposit successful.";
const CONNECTIVITY_DEGRADED: &str =
    "Connectivity degraded: unable to reach the payments service. Please try again.";

/// What the poller should do after a status was applied
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum StatusOutcome {
    /// Keep polling
    Continue,
    /// Success observed; finish after the settle delay
    Settle,
    /// Workflow moved to error; stop
    Stopped,
    /// Result belongs to a superseded generation; stop without touching state
    Stale,
}

#[derive(Debug, Default)]
struct Cell {
    state: WorkflowState,
    intent_id: Option<String>,
    intent_status: Option<IntentStatus>,
    message: Option<String>,
    error: Option<String>,
    generation: u64,
    polling: bool,
    settling: bool,
    consecutive_failures: u32,
}

impl Cell {
    fn snapshot(&self) -> WorkflowSnapshot {
        WorkflowSnapshot {
            state: self.state,
            intent_id: self.intent_id.clone(),
            intent_status: self.intent_status,
            message: self.message.clone(),
            error: self.error.clone(),
            polling: self.polling,
        }
    }

    fn accepts(&self, generation: u64) -> bool {
        self.generation == generation && self.state == WorkflowState::Waiting && !self.settling
    }

    fn fail(&mut self, error: String) {
        self.state = WorkflowState::Error;
        self.polling = false;
        self.settling = false;
        self.message = None;
        self.error = Some(error);
    }
}

/// State shared between the workflow and its poll task
#[derive(Debug)]
pub(crate) struct Shared {
    cell: Mutex<Cell>,
    tx: watch::Sender<WorkflowSnapshot>,
    max_poll_failures: Option<u32>,
}

impl Shared {
    fn new(max_poll_failures: Option<u32>) -> Self {
        let (tx, _) = watch::channel(WorkflowSnapshot::default());
        Self {
            cell: Mutex::new(Cell::default()),
            tx,
            max_poll_failures: max_poll_failures.filter(|max| *max > 0),
        }
    }

    fn lock(&self) -> MutexGuard<'_, Cell> {
        self.cell.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Apply `f` to the cell and publish the resulting snapshot
    fn update<R>(&self, f: impl FnOnce(&mut Cell) -> R) -> R {
        let mut cell = self.lock();
        let result = f(&mut cell);
        let snapshot = cell.snapshot();
        self.tx.send_if_modified(|current| {
            if *current != snapshot {
                *current = snapshot;
                true
            } else {
                false
            }
        });
        result
    }

    fn snapshot(&self) -> WorkflowSnapshot {
        self.lock().snapshot()
    }

    fn subscribe(&self) -> watch::Receiver<WorkflowSnapshot> {
        self.tx.subscribe()
    }

    #[cfg(test)]
    fn generation(&self) -> u64 {
        self.lock().generation
    }

    fn set_state(&self, state: WorkflowState) {
        self.update(|cell| {
            cell.state = state;
            cell.error = None;
        });
    }

    /// Invalidate anything in flight
    fn halt(&self) {
        self.update(|cell| {
            cell.generation += 1;
            cell.polling = false;
            cell.settling = false;
        });
    }

    /// Back to a clean form
    fn reset(&self) {
        self.update(|cell| {
            *cell = Cell {
                generation: cell.generation + 1,
                ..Cell::default()
            };
        });
    }

    fn fail(&self, error: String) {
        self.update(|cell| {
            cell.generation += 1;
            cell.fail(error);
        });
    }

    /// Enter waiting for a fresh intent; returns the generation to poll under
    fn begin_waiting(&self, intent_id: &str, message: &str) -> u64 {
        self.update(|cell| {
            cell.generation += 1;
            cell.state = WorkflowState::Waiting;
            cell.intent_id = Some(intent_id.to_string());
            cell.intent_status = Some(IntentStatus::Pending);
            cell.message = Some(message.to_string());
            cell.error = None;
            cell.polling = true;
            cell.settling = false;
            cell.consecutive_failures = 0;
            cell.generation
        })
    }

    /// Intent and generation while waiting
    fn waiting_intent(&self) -> Option<(u64, String)> {
        let cell = self.lock();
        match (&cell.state, &cell.intent_id) {
            (WorkflowState::Waiting, Some(id)) => Some((cell.generation, id.clone())),
            _ => None,
        }
    }

    fn set_general_error(&self, generation: u64, error: Option<String>) {
        self.update(|cell| {
            if cell.generation == generation {
                cell.error = error;
            }
        });
    }

    pub(crate) fn apply_status(&self, generation: u64, status: IntentStatus) -> StatusOutcome {
        let (outcome, intent_id) = self.update(|cell| {
            if !cell.accepts(generation) {
                return (StatusOutcome::Stale, None);
            }
            cell.intent_status = Some(status);
            cell.consecutive_failures = 0;

            let outcome = match status {
                IntentStatus::Success => {
                    cell.polling = false;
                    cell.settling = true;
                    cell.message = Some(SETTLING_MESSAGE.to_string());
                    StatusOutcome::Settle
                }
                s if s.is_failure() => {
                    cell.fail(format!("Payment {}. Please try again.", s));
                    StatusOutcome::Stopped
                }
                _ => StatusOutcome::Continue,
            };
            (outcome, cell.intent_id.clone())
        });

        if status.is_failure() && outcome == StatusOutcome::Stopped {
            log_deposit_event(
                "deposit_failed",
                intent_id.as_deref(),
                "error",
                false,
                Some(&status.to_string()),
            );
        }
        outcome
    }

    pub(crate) fn record_poll_failure(&self, generation: u64, error: &ApiError) -> StatusOutcome {
        let max = self.max_poll_failures;
        let (outcome, intent_id, failures) = self.update(|cell| {
            if !cell.accepts(generation) {
                return (StatusOutcome::Stale, None, 0);
            }
            cell.consecutive_failures += 1;

            let outcome = match max {
                Some(max) if cell.consecutive_failures >= max => {
                    cell.fail(CONNECTIVITY_DEGRADED.to_string());
                    StatusOutcome::Stopped
                }
                _ => StatusOutcome::Continue,
            };
            (outcome, cell.intent_id.clone(), cell.consecutive_failures)
        });

        match outcome {
            StatusOutcome::Continue => {
                tracing::debug!(
                    target: "vault5::deposit",
                    failures,
                    error = %error,
                    "status poll failed"
                );
            }
            StatusOutcome::Stopped => log_deposit_event(
                "poll_failures_exhausted",
                intent_id.as_deref(),
                "error",
                false,
                Some(&error.to_string()),
            ),
            _ => {}
        }
        outcome
    }

    /// Complete a settled success; happens at most once per generation
    pub(crate) fn finish_success(&self, generation: u64) -> bool {
        let (finished, intent_id) = self.update(|cell| {
            if cell.generation != generation
                || !cell.settling
                || cell.state != WorkflowState::Waiting
            {
                return (false, None);
            }
            cell.settling = false;
            cell.state = WorkflowState::Success;
            cell.message = Some(SUCCESS_MESSAGE.to_string());
            (true, cell.intent_id.clone())
        });

        if finished {
            log_deposit_event("deposit_succeeded", intent_id.as_deref(), "success", true, None);
        }
        finished
    }
}

/// Deposit workflow for one open dialog
pub struct DepositWorkflow {
    gateway: Arc<dyn DepositGateway>,
    config: WorkflowConfig,
    shared: Arc<Shared>,
    form: DepositForm,
    field_errors: ValidationErrors,
    validated: Option<ValidDeposit>,
    accounts: Vec<Account>,
    poller: Option<StatusPoller>,
    on_success: Option<Box<dyn FnMut() + Send>>,
}

impl std::fmt::Debug for DepositWorkflow {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DepositWorkflow")
            .field("snapshot", &self.shared.snapshot())
            .field("form", &self.form)
            .field("poller", &self.poller)
            .finish_non_exhaustive()
    }
}

impl DepositWorkflow {
    pub fn new(gateway: Arc<dyn DepositGateway>, config: WorkflowConfig) -> Self {
        let shared = Arc::new(Shared::new(config.max_poll_failures));
        Self {
            gateway,
            config,
            shared,
            form: DepositForm::default(),
            field_errors: ValidationErrors::new(),
            validated: None,
            accounts: Vec::new(),
            poller: None,
            on_success: None,
        }
    }

    /// Called when the user acknowledges a successful deposit, typically to
    /// refresh balances
    pub fn with_success_callback(mut self, callback: impl FnMut() + Send + 'static) -> Self {
        self.on_success = Some(Box::new(callback));
        self
    }

    pub fn state(&self) -> WorkflowState {
        self.shared.snapshot().state
    }

    pub fn snapshot(&self) -> WorkflowSnapshot {
        self.shared.snapshot()
    }

    /// Receiver that sees every published state change
    pub fn subscribe(&self) -> watch::Receiver<WorkflowSnapshot> {
        self.shared.subscribe()
    }

    pub fn form(&self) -> &DepositForm {
        &self.form
    }

    pub fn field_errors(&self) -> &ValidationErrors {
        &self.field_errors
    }

    pub fn config(&self) -> &WorkflowConfig {
        &self.config
    }

    /// Accounts loaded by [`load_accounts`](Self::load_accounts)
    pub fn accounts(&self) -> &[Account] {
        &self.accounts
    }

    /// Whether a status poll task is active
    pub fn is_polling(&self) -> bool {
        self.poller.as_ref().is_some_and(|p| !p.is_finished()) && self.shared.snapshot().polling
    }

    fn expect_state(&self, expected: WorkflowState, action: &str) -> Result<()> {
        let state = self.state();
        if state != expected {
            return Err(Vault5Error::workflow(format!(
                "cannot {} in the {} step",
                action, state
            )));
        }
        Ok(())
    }

    /// Edit the form; only allowed on the form step
    pub fn edit_form(&mut self, edit: impl FnOnce(&mut DepositForm)) -> Result<()> {
        self.expect_state(WorkflowState::Form, "edit the form")?;
        edit(&mut self.form);
        Ok(())
    }

    /// Fetch deposit targets for the form
    pub async fn load_accounts(&mut self) -> Result<&[Account]> {
        self.accounts = self.gateway.list_accounts().await?;
        Ok(&self.accounts)
    }

    /// Validate the form and move to the confirm step. Invalid input keeps
    /// the form step and records per-field errors.
    pub fn submit(&mut self) -> Result<()> {
        self.expect_state(WorkflowState::Form, "submit")?;

        match validate(&self.form) {
            Ok(valid) => {
                self.field_errors = ValidationErrors::new();
                self.validated = Some(valid);
                self.shared.set_state(WorkflowState::Confirm);
                Ok(())
            }
            Err(errors) => {
                self.field_errors = errors.clone();
                self.validated = None;
                Err(errors.into())
            }
        }
    }

    /// Read-only summary of the validated deposit
    pub fn summary(&self) -> Option<DepositSummary> {
        let valid = self.validated.as_ref()?;
        let mut rows = vec![
            (
                "Amount".to_string(),
                format!("{} {}", self.config.currency, valid.amount),
            ),
            ("Method".to_string(), valid.provider.label().to_string()),
            (
                "Deposit to".to_string(),
                target_label(&valid.target, &self.accounts),
            ),
        ];
        if valid.provider.requires_phone() {
            if let Some(phone) = &valid.phone {
                rows.push(("Phone".to_string(), phone.clone()));
            }
        }
        Some(DepositSummary { rows })
    }

    /// Confirm step back to the form, fields intact
    pub fn back(&mut self) -> Result<()> {
        self.expect_state(WorkflowState::Confirm, "go back")?;
        self.validated = None;
        self.shared.set_state(WorkflowState::Form);
        Ok(())
    }

    /// Initiate the deposit and start polling its status.
    ///
    /// A rejected initiation is recorded as the error step; `Err` is only
    /// returned when called outside the confirm step.
    pub async fn confirm(&mut self) -> Result<WorkflowState> {
        self.expect_state(WorkflowState::Confirm, "confirm")?;
        let valid = self
            .validated
            .clone()
            .ok_or_else(|| Vault5Error::workflow("nothing to confirm"))?;

        let request = valid.to_request(&self.config.currency);
        match self.gateway.initiate_deposit(&request).await {
            Ok(intent) => {
                self.stop_polling();
                let message = if valid.provider.requires_phone() {
                    "Check your phone and enter your PIN to complete the payment."
                } else {
                    "Complete the transfer with your bank. We'll update this once it arrives."
                };
                let generation = self.shared.begin_waiting(&intent.id, message);
                self.poller = Some(StatusPoller::spawn(
                    Arc::clone(&self.shared),
                    Arc::clone(&self.gateway),
                    intent.id.clone(),
                    self.config.poll_interval,
                    self.config.settle_delay,
                    generation,
                ));
                log_deposit_event("deposit_initiated", Some(&intent.id), "waiting", true, None);
            }
            Err(e) => {
                let message = e.user_message(INITIATE_FAILED);
                log_deposit_event(
                    "deposit_initiation_failed",
                    None,
                    "error",
                    false,
                    Some(&e.to_string()),
                );
                self.shared.fail(message);
            }
        }
        Ok(self.state())
    }

    /// The user says they completed the payment. Tells the backend, then
    /// checks the status once after a short delay. The running poll keeps
    /// going; a failed confirmation stays in waiting with the error set.
    pub async fn manual_confirm(&mut self) -> Result<WorkflowState> {
        let (generation, intent_id) = self.shared.waiting_intent().ok_or_else(|| {
            Vault5Error::workflow("manual confirmation is only available while waiting")
        })?;

        if let Err(e) = self.gateway.confirm_deposit(&intent_id).await {
            log_deposit_event(
                "manual_confirm_failed",
                Some(&intent_id),
                "waiting",
                false,
                Some(&e.to_string()),
            );
            self.shared
                .set_general_error(generation, Some(e.user_message(CONFIRM_FAILED)));
            return Ok(self.state());
        }
        self.shared.set_general_error(generation, None);

        tokio::time::sleep(self.config.manual_check_delay).await;

        match self.gateway.transaction_status(&intent_id).await {
            Ok(status) => match self.shared.apply_status(generation, status) {
                StatusOutcome::Settle => {
                    // replaces the interval; the settle outlives this future
                    self.poller = Some(StatusPoller::settle(
                        Arc::clone(&self.shared),
                        generation,
                        self.config.settle_delay,
                    ));
                    let mut rx = self.subscribe();
                    let _ = rx.wait_for(|s| s.state != WorkflowState::Waiting).await;
                }
                StatusOutcome::Stopped => self.poller = None,
                StatusOutcome::Continue | StatusOutcome::Stale => {}
            },
            Err(e) => {
                tracing::debug!(
                    target: "vault5::deposit",
                    intent_id = %intent_id,
                    error = %e,
                    "status check after manual confirmation failed"
                );
            }
        }
        Ok(self.state())
    }

    /// Wait until the workflow reaches success or error
    pub async fn wait_for_outcome(&self) -> Result<WorkflowSnapshot> {
        let mut rx = self.subscribe();
        let snapshot = rx
            .wait_for(|s| s.state.is_outcome())
            .await
            .map_err(|_| Vault5Error::workflow("workflow closed"))?;
        Ok(snapshot.clone())
    }

    /// Acknowledge success: notify the caller and reset
    pub fn done(&mut self) -> Result<()> {
        self.expect_state(WorkflowState::Success, "finish")?;
        if let Some(callback) = self.on_success.as_mut() {
            callback();
        }
        self.close();
        Ok(())
    }

    /// From the error step back to the form with the previous input
    pub fn try_again(&mut self) -> Result<()> {
        self.expect_state(WorkflowState::Error, "try again")?;
        self.stop_polling();
        self.validated = None;
        self.field_errors = ValidationErrors::new();
        self.shared.reset();
        Ok(())
    }

    /// Reset to an empty form from any step
    pub fn close(&mut self) {
        self.stop_polling();
        self.form = DepositForm::default();
        self.validated = None;
        self.field_errors = ValidationErrors::new();
        self.shared.reset();
        log_deposit_event("deposit_reset", None, "form", true, None);
    }

    fn stop_polling(&mut self) {
        self.shared.halt();
        self.poller = None;
    }

    #[cfg(test)]
    fn generation(&self) -> u64 {
        self.shared.generation()
    }
}

impl Drop for DepositWorkflow {
    fn drop(&mut self) {
        self.stop_polling();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::{MockDepositGateway, PaymentIntent, Provider};
    use crate::http::HttpError;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    fn config() -> WorkflowConfig {
        WorkflowConfig::default()
    }

    fn fill_mpesa(form: &mut DepositForm) {
        form.amount = "500".to_string();
        form.provider = Some(Provider::Mpesa);
        form.phone = "254712345678".to_string();
    }

    fn initiates(mock: &mut MockDepositGateway, id: &'static str) {
        mock.expect_initiate_deposit()
            .returning(move |_| Ok(PaymentIntent::pending(id)));
    }

    /// Statuses returned in order; `None` is a failed request. Pending once
    /// the script runs out.
    fn scripted_statuses(
        mock: &mut MockDepositGateway,
        script: Vec<Option<IntentStatus>>,
    ) -> Arc<AtomicUsize> {
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&calls);
        mock.expect_transaction_status().returning(move |_| {
            let n = counter.fetch_add(1, Ordering::SeqCst);
            match script.get(n).copied().unwrap_or(Some(IntentStatus::Pending)) {
                Some(status) => Ok(status),
                None => Err(ApiError::Http(HttpError::Status {
                    status: 503,
                    body: String::new(),
                })),
            }
        });
        calls
    }

    async fn waiting(mock: MockDepositGateway) -> DepositWorkflow {
        let mut workflow = DepositWorkflow::new(Arc::new(mock), config());
        workflow.edit_form(fill_mpesa).unwrap();
        workflow.submit().unwrap();
        let state = workflow.confirm().await.unwrap();
        assert_eq!(state, WorkflowState::Waiting);
        workflow
    }

    async fn advance(ms: u64) {
        tokio::time::sleep(Duration::from_millis(ms)).await;
    }

    #[tokio::test]
    async fn test_invalid_amount_blocks_submission() {
        let mut mock = MockDepositGateway::new();
        mock.expect_initiate_deposit().never();
        let mut workflow = DepositWorkflow::new(Arc::new(mock), config());

        for amount in ["0", "-10", ""] {
            workflow
                .edit_form(|f| {
                    fill_mpesa(f);
                    f.amount = amount.to_string();
                })
                .unwrap();
            let err = workflow.submit().unwrap_err();
            assert!(matches!(err, Vault5Error::Validation(_)));
            assert_eq!(workflow.state(), WorkflowState::Form);
            assert!(workflow.field_errors().get(crate::deposit::Field::Amount).is_some());
        }

        assert!(workflow.confirm().await.is_err());
        assert_eq!(workflow.state(), WorkflowState::Form);
    }

    #[tokio::test]
    async fn test_bank_summary_has_no_phone_row() {
        let mock = MockDepositGateway::new();
        let mut workflow = DepositWorkflow::new(Arc::new(mock), config());
        workflow
            .edit_form(|f| {
                f.amount = "2500".to_string();
                f.provider = Some(Provider::Bank);
            })
            .unwrap();
        workflow.submit().unwrap();
        assert_eq!(workflow.state(), WorkflowState::Confirm);

        let summary = workflow.summary().unwrap();
        assert_eq!(summary.row("Amount"), Some("KES 2500"));
        assert_eq!(summary.row("Method"), Some("Bank"));
        assert_eq!(summary.row("Deposit to"), Some("Wallet"));
        assert_eq!(summary.row("Phone"), None);
    }

    #[tokio::test]
    async fn test_back_keeps_fields() {
        let mock = MockDepositGateway::new();
        let mut workflow = DepositWorkflow::new(Arc::new(mock), config());
        workflow.edit_form(fill_mpesa).unwrap();
        workflow.submit().unwrap();
        assert_eq!(
            workflow.summary().unwrap().row("Phone"),
            Some("254712345678")
        );
        assert!(workflow.edit_form(|f| f.amount.clear()).is_err());

        workflow.back().unwrap();
        assert_eq!(workflow.state(), WorkflowState::Form);
        assert_eq!(workflow.form().amount, "500");
        assert!(workflow.summary().is_none());
    }

    #[tokio::test]
    async fn test_summary_uses_account_names() {
        let mut mock = MockDepositGateway::new();
        mock.expect_list_accounts().times(1).returning(|| {
            Ok(vec![Account {
                id: "acc1".to_string(),
                name: Some("School Fees".to_string()),
                currency: Some("KES".to_string()),
                balance: None,
            }])
        });
        let mut workflow = DepositWorkflow::new(Arc::new(mock), config());
        assert_eq!(workflow.load_accounts().await.unwrap().len(), 1);

        workflow
            .edit_form(|f| {
                f.amount = "100".to_string();
                f.provider = Some(Provider::Bank);
                f.target = "acc1".to_string();
            })
            .unwrap();
        workflow.submit().unwrap();
        assert_eq!(
            workflow.summary().unwrap().row("Deposit to"),
            Some("School Fees")
        );
    }

    #[tokio::test]
    async fn test_initiation_failure_uses_server_message() {
        let mut mock = MockDepositGateway::new();
        mock.expect_initiate_deposit().times(1).returning(|_| {
            Err(ApiError::Http(HttpError::Status {
                status: 400,
                body: r#"{"success":false,"message":"Amount below minimum"}"#.to_string(),
            }))
        });
        mock.expect_transaction_status().never();
        let mut workflow = DepositWorkflow::new(Arc::new(mock), config());
        workflow.edit_form(fill_mpesa).unwrap();
        workflow.submit().unwrap();

        assert_eq!(workflow.confirm().await.unwrap(), WorkflowState::Error);
        let snapshot = workflow.snapshot();
        assert_eq!(snapshot.error.as_deref(), Some("Amount below minimum"));
        assert!(!workflow.is_polling());
    }

    #[tokio::test]
    async fn test_malformed_initiation_uses_default_message() {
        let mut mock = MockDepositGateway::new();
        mock.expect_initiate_deposit()
            .returning(|_| Err(ApiError::Malformed("missing data".to_string())));
        let mut workflow = DepositWorkflow::new(Arc::new(mock), config());
        workflow.edit_form(fill_mpesa).unwrap();
        workflow.submit().unwrap();

        workflow.confirm().await.unwrap();
        assert_eq!(workflow.snapshot().error.as_deref(), Some(INITIATE_FAILED));
    }

    #[tokio::test(start_paused = true)]
    async fn test_pending_then_success_settles_once() {
        let mut mock = MockDepositGateway::new();
        initiates(&mut mock, "tx1");
        let calls = scripted_statuses(
            &mut mock,
            vec![
                Some(IntentStatus::Pending),
                Some(IntentStatus::Pending),
                Some(IntentStatus::Success),
            ],
        );
        let workflow = waiting(mock).await;
        assert!(workflow.is_polling());

        // third poll lands at 9s
        advance(9_500).await;
        assert_eq!(calls.load(Ordering::SeqCst), 3);
        let snapshot = workflow.snapshot();
        assert_eq!(snapshot.state, WorkflowState::Waiting);
        assert_eq!(snapshot.message.as_deref(), Some(SETTLING_MESSAGE));
        assert!(!snapshot.polling);
        assert!(!workflow.is_polling());

        advance(1_000).await;
        assert_eq!(workflow.state(), WorkflowState::Success);

        advance(30_000).await;
        assert_eq!(calls.load(Ordering::SeqCst), 3);
        assert_eq!(workflow.state(), WorkflowState::Success);
    }

    #[tokio::test(start_paused = true)]
    async fn test_success_callback_runs_on_done() {
        let mut mock = MockDepositGateway::new();
        initiates(&mut mock, "tx1");
        scripted_statuses(&mut mock, vec![Some(IntentStatus::Success)]);

        let refreshed = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&refreshed);
        let mut workflow = DepositWorkflow::new(Arc::new(mock), config())
            .with_success_callback(move || {
                counter.fetch_add(1, Ordering::SeqCst);
            });
        workflow.edit_form(fill_mpesa).unwrap();
        workflow.submit().unwrap();
        workflow.confirm().await.unwrap();

        let outcome = workflow.wait_for_outcome().await.unwrap();
        assert_eq!(outcome.state, WorkflowState::Success);
        assert_eq!(outcome.intent_id.as_deref(), Some("tx1"));

        workflow.done().unwrap();
        assert_eq!(refreshed.load(Ordering::SeqCst), 1);
        assert_eq!(workflow.state(), WorkflowState::Form);
        assert!(workflow.form().amount.is_empty());
        assert!(workflow.done().is_err());
    }

    #[tokio::test(start_paused = true)]
    async fn test_terminal_failures_name_the_status() {
        for (status, word) in [
            (IntentStatus::Failed, "failed"),
            (IntentStatus::Canceled, "canceled"),
            (IntentStatus::Expired, "expired"),
        ] {
            let mut mock = MockDepositGateway::new();
            initiates(&mut mock, "tx1");
            let calls = scripted_statuses(&mut mock, vec![Some(status)]);
            let workflow = waiting(mock).await;

            advance(3_500).await;
            let snapshot = workflow.snapshot();
            assert_eq!(snapshot.state, WorkflowState::Error);
            assert!(snapshot.error.unwrap().contains(word));
            assert!(!workflow.is_polling());

            advance(30_000).await;
            assert_eq!(calls.load(Ordering::SeqCst), 1);
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_unknown_status_keeps_polling() {
        let mut mock = MockDepositGateway::new();
        initiates(&mut mock, "tx1");
        let calls = scripted_statuses(
            &mut mock,
            vec![Some(IntentStatus::Unknown), Some(IntentStatus::Unknown)],
        );
        let workflow = waiting(mock).await;

        advance(12_500).await;
        assert_eq!(calls.load(Ordering::SeqCst), 4);
        assert_eq!(workflow.state(), WorkflowState::Waiting);
        assert!(workflow.is_polling());
    }

    #[tokio::test(start_paused = true)]
    async fn test_transient_failures_are_ignored_below_cap() {
        let mut mock = MockDepositGateway::new();
        initiates(&mut mock, "tx1");
        let calls = scripted_statuses(
            &mut mock,
            vec![
                None,
                None,
                Some(IntentStatus::Pending),
                None,
                None,
                Some(IntentStatus::Success),
            ],
        );
        let mut cfg = config();
        cfg.max_poll_failures = Some(3);
        let mut workflow = DepositWorkflow::new(Arc::new(mock), cfg);
        workflow.edit_form(fill_mpesa).unwrap();
        workflow.submit().unwrap();
        workflow.confirm().await.unwrap();

        advance(15_000).await;
        assert_eq!(workflow.snapshot().error, None);
        advance(4_500).await;
        assert_eq!(calls.load(Ordering::SeqCst), 6);
        assert_eq!(workflow.state(), WorkflowState::Success);
    }

    #[tokio::test(start_paused = true)]
    async fn test_consecutive_failures_degrade_connectivity() {
        let mut mock = MockDepositGateway::new();
        initiates(&mut mock, "tx1");
        let calls = scripted_statuses(&mut mock, vec![None; 20]);
        let mut cfg = config();
        cfg.max_poll_failures = Some(3);
        let mut workflow = DepositWorkflow::new(Arc::new(mock), cfg);
        workflow.edit_form(fill_mpesa).unwrap();
        workflow.submit().unwrap();
        workflow.confirm().await.unwrap();

        advance(6_500).await;
        assert_eq!(workflow.state(), WorkflowState::Waiting);

        advance(3_000).await;
        let snapshot = workflow.snapshot();
        assert_eq!(snapshot.state, WorkflowState::Error);
        assert!(snapshot.error.unwrap().contains("Connectivity degraded"));

        advance(30_000).await;
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_failure_cap_disabled() {
        let mut mock = MockDepositGateway::new();
        initiates(&mut mock, "tx1");
        let calls = scripted_statuses(&mut mock, vec![None; 50]);
        let mut cfg = config();
        cfg.max_poll_failures = None;
        let mut workflow = DepositWorkflow::new(Arc::new(mock), cfg);
        workflow.edit_form(fill_mpesa).unwrap();
        workflow.submit().unwrap();
        workflow.confirm().await.unwrap();

        advance(60_500).await;
        assert_eq!(calls.load(Ordering::SeqCst), 20);
        assert_eq!(workflow.state(), WorkflowState::Waiting);
    }

    #[tokio::test(start_paused = true)]
    async fn test_retry_never_leaves_a_second_poller() {
        let mut mock = MockDepositGateway::new();
        let initiated = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&initiated);
        mock.expect_initiate_deposit().returning(move |_| {
            let n = counter.fetch_add(1, Ordering::SeqCst);
            Ok(PaymentIntent::pending(format!("tx{}", n + 1)))
        });
        let polled = Arc::new(Mutex::new(Vec::<String>::new()));
        let log = Arc::clone(&polled);
        mock.expect_transaction_status().returning(move |id| {
            log.lock().unwrap().push(id.to_string());
            if id == "tx1" {
                Ok(IntentStatus::Expired)
            } else {
                Ok(IntentStatus::Pending)
            }
        });

        let mut workflow = waiting(mock).await;
        let first_generation = workflow.generation();
        advance(3_500).await;
        assert_eq!(workflow.state(), WorkflowState::Error);

        workflow.try_again().unwrap();
        assert_eq!(workflow.state(), WorkflowState::Form);
        assert_eq!(workflow.form().phone, "254712345678");
        workflow.submit().unwrap();
        workflow.confirm().await.unwrap();
        assert!(workflow.generation() > first_generation);

        advance(9_500).await;
        let polled = polled.lock().unwrap().clone();
        assert_eq!(polled, vec!["tx1", "tx2", "tx2", "tx2"]);
        assert!(workflow.is_polling());
    }

    #[tokio::test(start_paused = true)]
    async fn test_close_from_every_state() {
        for target in [
            WorkflowState::Form,
            WorkflowState::Confirm,
            WorkflowState::Waiting,
            WorkflowState::Success,
            WorkflowState::Error,
        ] {
            let mut mock = MockDepositGateway::new();
            initiates(&mut mock, "tx1");
            let final_status = if target == WorkflowState::Error {
                IntentStatus::Failed
            } else {
                IntentStatus::Success
            };
            let calls = scripted_statuses(&mut mock, vec![Some(final_status)]);
            let mut workflow = DepositWorkflow::new(Arc::new(mock), config());
            workflow.edit_form(fill_mpesa).unwrap();

            if target != WorkflowState::Form {
                workflow.submit().unwrap();
            }
            if matches!(
                target,
                WorkflowState::Waiting | WorkflowState::Success | WorkflowState::Error
            ) {
                workflow.confirm().await.unwrap();
            }
            if target.is_outcome() {
                workflow.wait_for_outcome().await.unwrap();
            }
            assert_eq!(workflow.state(), target);

            workflow.close();
            let snapshot = workflow.snapshot();
            assert_eq!(snapshot, WorkflowSnapshot::default());
            assert_eq!(workflow.form(), &DepositForm::default());
            assert!(workflow.field_errors().is_empty());
            assert!(!workflow.is_polling());

            let before = calls.load(Ordering::SeqCst);
            advance(20_000).await;
            assert_eq!(calls.load(Ordering::SeqCst), before);
            assert_eq!(workflow.state(), WorkflowState::Form);
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_close_during_settle_discards_success() {
        let mut mock = MockDepositGateway::new();
        initiates(&mut mock, "tx1");
        scripted_statuses(&mut mock, vec![Some(IntentStatus::Success)]);
        let mut workflow = waiting(mock).await;

        advance(3_500).await;
        assert_eq!(workflow.snapshot().message.as_deref(), Some(SETTLING_MESSAGE));
        workflow.close();

        advance(5_000).await;
        assert_eq!(workflow.state(), WorkflowState::Form);
    }

    #[tokio::test(start_paused = true)]
    async fn test_drop_stops_polling() {
        let mut mock = MockDepositGateway::new();
        initiates(&mut mock, "tx1");
        let calls = scripted_statuses(&mut mock, vec![]);
        let workflow = waiting(mock).await;

        advance(3_500).await;
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        drop(workflow);

        advance(30_000).await;
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_manual_confirm_checks_once() {
        let mut mock = MockDepositGateway::new();
        initiates(&mut mock, "tx1");
        mock.expect_confirm_deposit()
            .withf(|id| id == "tx1")
            .times(1)
            .returning(|_| Ok(()));
        let calls = scripted_statuses(&mut mock, vec![Some(IntentStatus::Success)]);
        let mut workflow = waiting(mock).await;

        // manual check at 1.2s, settle until 2.2s; the interval never fires
        let state = workflow.manual_confirm().await.unwrap();
        assert_eq!(state, WorkflowState::Success);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert!(!workflow.is_polling());

        advance(10_000).await;
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_abandoned_manual_confirm_still_settles() {
        let mut mock = MockDepositGateway::new();
        initiates(&mut mock, "tx1");
        mock.expect_confirm_deposit().returning(|_| Ok(()));
        let calls = scripted_statuses(&mut mock, vec![Some(IntentStatus::Success)]);
        let mut workflow = waiting(mock).await;

        // caller gives up at 1.5s, inside the settle delay
        let abandoned =
            tokio::time::timeout(Duration::from_millis(1_500), workflow.manual_confirm()).await;
        assert!(abandoned.is_err());
        assert_eq!(workflow.state(), WorkflowState::Waiting);

        advance(60_000).await;
        assert_eq!(workflow.state(), WorkflowState::Success);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert!(!workflow.is_polling());
    }

    #[tokio::test(start_paused = true)]
    async fn test_close_during_manual_settle_discards_success() {
        let mut mock = MockDepositGateway::new();
        initiates(&mut mock, "tx1");
        mock.expect_confirm_deposit().returning(|_| Ok(()));
        scripted_statuses(&mut mock, vec![Some(IntentStatus::Success)]);
        let mut workflow = waiting(mock).await;

        let abandoned =
            tokio::time::timeout(Duration::from_millis(1_500), workflow.manual_confirm()).await;
        assert!(abandoned.is_err());
        workflow.close();

        advance(60_000).await;
        assert_eq!(workflow.state(), WorkflowState::Form);
    }

    #[tokio::test(start_paused = true)]
    async fn test_manual_confirm_pending_keeps_interval() {
        let mut mock = MockDepositGateway::new();
        initiates(&mut mock, "tx1");
        mock.expect_confirm_deposit().returning(|_| Ok(()));
        let calls = scripted_statuses(&mut mock, vec![]);
        let mut workflow = waiting(mock).await;

        assert_eq!(
            workflow.manual_confirm().await.unwrap(),
            WorkflowState::Waiting
        );
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert!(workflow.is_polling());

        // interval ticks at 3s and 6s, nothing extra
        advance(5_000).await;
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_manual_confirm_failure_stays_waiting() {
        let mut mock = MockDepositGateway::new();
        initiates(&mut mock, "tx1");
        mock.expect_confirm_deposit().times(1).returning(|_| {
            Err(ApiError::Http(HttpError::Status {
                status: 409,
                body: r#"{"message":"Payment not yet received"}"#.to_string(),
            }))
        });
        let calls = scripted_statuses(&mut mock, vec![]);
        let mut workflow = waiting(mock).await;

        let state = workflow.manual_confirm().await.unwrap();
        assert_eq!(state, WorkflowState::Waiting);
        let snapshot = workflow.snapshot();
        assert_eq!(snapshot.error.as_deref(), Some("Payment not yet received"));
        assert_eq!(calls.load(Ordering::SeqCst), 0);
        assert!(workflow.is_polling());
    }

    #[tokio::test]
    async fn test_manual_confirm_outside_waiting() {
        let mut mock = MockDepositGateway::new();
        mock.expect_confirm_deposit().never();
        let mut workflow = DepositWorkflow::new(Arc::new(mock), config());
        assert!(workflow.manual_confirm().await.is_err());
    }

    #[tokio::test(start_paused = true)]
    async fn test_subscribers_see_transitions() {
        let mut mock = MockDepositGateway::new();
        initiates(&mut mock, "tx1");
        scripted_statuses(&mut mock, vec![Some(IntentStatus::Failed)]);
        let mut workflow = DepositWorkflow::new(Arc::new(mock), config());
        let mut rx = workflow.subscribe();

        workflow.edit_form(fill_mpesa).unwrap();
        workflow.submit().unwrap();
        assert!(rx.has_changed().unwrap());
        assert_eq!(rx.borrow_and_update().state, WorkflowState::Confirm);

        workflow.confirm().await.unwrap();
        assert_eq!(rx.borrow_and_update().state, WorkflowState::Waiting);

        rx.changed().await.unwrap();
        assert_eq!(rx.borrow().state, WorkflowState::Error);
    }
}
