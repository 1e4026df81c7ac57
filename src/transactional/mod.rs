//! Declarative transactions as around advice.
//!
//! [`transactional_rule`] builds an interception rule that begins, joins or
//! suspends a transaction around each matching call, following the
//! configured [`Propagation`]. Managers are supplied by the application.

use crate::aspect::{InterceptionRule, Pointcut};
use crate::interceptor::{InvocationResult, JoinPoint, Proceed};
use serde::{Deserialize, Serialize};
use std::cell::RefCell;
use std::sync::{Arc, Mutex, PoisonError};
use strum_macros::Display;
use thiserror::Error;

thread_local! {
    /// Transaction context of the calling thread, innermost last.
    ///
    /// `None` entries mark a suspended outer transaction.
    static ACTIVE_TRANSACTION: RefCell<Vec<Option<ActiveTransaction>>> = const { RefCell::new(Vec::new()) };
}

/// Retrieves the currently active transaction of this thread.
///
/// This allows repositories or services to get access to the transaction
/// started by a transactional rule without needing it to be passed as an
/// explicit argument. Returns `None` if no transaction is active.
pub fn current_transaction() -> Option<ActiveTransaction> {
    ACTIVE_TRANSACTION.with(|stack| stack.borrow().last().cloned().flatten())
}

struct ContextGuard;

impl ContextGuard {
    fn push(transaction: Option<ActiveTransaction>) -> Self {
        ACTIVE_TRANSACTION.with(|stack| stack.borrow_mut().push(transaction));
        Self
    }
}

impl Drop for ContextGuard {
    fn drop(&mut self) {
        ACTIVE_TRANSACTION.with(|stack| {
            stack.borrow_mut().pop();
        });
    }
}

#[derive(Debug, Error)]
pub enum TransactionError {
    #[error("No existing transaction found for '{0}' marked as mandatory")]
    Mandatory(String),

    #[error("Existing transaction found for '{0}' marked as never")]
    Never(String),

    #[error("Transaction failed: {0}")]
    Failed(String),

    #[error("Transaction has already been completed")]
    Finalized,
}

/// Represents the isolation levels for database transactions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IsolationLevel {
    /// May read uncommitted changes of other transactions.
    ReadUncommitted,
    /// Reads only committed data; repeated reads may differ.
    ReadCommitted,
    /// Repeated reads of a row return the same data.
    RepeatableRead,
    /// Transactions behave as if run one after another.
    Serializable,
}

/// How a transactional call relates to a transaction already in progress.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Display, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Propagation {
    /// Join the current transaction, or start one.
    #[default]
    Required,
    /// Always start a new transaction, suspending the current one.
    RequiresNew,
    /// Join the current transaction if there is one.
    Supports,
    /// Join the current transaction; fail without one.
    Mandatory,
    /// Run without a transaction; fail if one is active.
    Never,
    /// Run without a transaction, suspending the current one.
    NotSupported,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TransactionOptions {
    pub isolation: Option<IsolationLevel>,
    pub propagation: Propagation,
    pub read_only: bool,
}

impl TransactionOptions {
    pub fn propagation(mut self, propagation: Propagation) -> Self {
        self.propagation = propagation;
        self
    }

    pub fn isolation(mut self, isolation: IsolationLevel) -> Self {
        self.isolation = Some(isolation);
        self
    }

    pub fn read_only(mut self) -> Self {
        self.read_only = true;
        self
    }
}

/// Trait for managing transactions
pub trait TransactionManager: Send + Sync + 'static {
    /// Begin a new transaction with options
    fn begin(&self, options: &TransactionOptions) -> Result<Box<dyn Transaction>, TransactionError>;
}

/// A generic transaction abstraction
pub trait Transaction: Send {
    fn commit(&mut self) -> Result<(), TransactionError>;

    fn rollback(&mut self) -> Result<(), TransactionError>;
}

/// Shared handle to the transaction of the current call chain.
#[derive(Clone)]
pub struct ActiveTransaction(Arc<Mutex<Box<dyn Transaction>>>);

impl ActiveTransaction {
    fn new(transaction: Box<dyn Transaction>) -> Self {
        Self(Arc::new(Mutex::new(transaction)))
    }

    /// Run `f` with exclusive access to the transaction.
    pub fn with<R>(&self, f: impl FnOnce(&mut dyn Transaction) -> R) -> R {
        let mut guard = self.0.lock().unwrap_or_else(PoisonError::into_inner);
        f(guard.as_mut())
    }

    pub fn same_as(&self, other: &ActiveTransaction) -> bool {
        Arc::ptr_eq(&self.0, &other.0)
    }
}

/// A rule running each matching call under `options`.
///
/// # Example
/// ```rust,ignore
/// let rule = transactional_rule(
///     "tx",
///     Pointcut::type_name("*Service").operations("save*"),
///     Arc::new(PgTransactionManager::new(pool)),
///     TransactionOptions::default(),
/// )?;
/// ```
pub fn transactional_rule(
    name: impl Into<String>,
    pointcut: Pointcut,
    manager: Arc<dyn TransactionManager>,
    options: TransactionOptions,
) -> crate::Result<InterceptionRule> {
    InterceptionRule::builder(name, pointcut)
        .around(move |jp, proceed| run_in_context(jp, proceed, manager.as_ref(), &options))
        .build()
}

fn run_in_context(
    jp: &JoinPoint,
    proceed: Proceed<'_>,
    manager: &dyn TransactionManager,
    options: &TransactionOptions,
) -> InvocationResult {
    let current = current_transaction();
    match (options.propagation, current) {
        (Propagation::Required | Propagation::Supports | Propagation::Mandatory, Some(_)) => {
            tracing::debug!("{} joins the current transaction", jp.signature());
            proceed.proceed()
        }
        (Propagation::Required | Propagation::RequiresNew, None)
        | (Propagation::RequiresNew, Some(_)) => run_new(jp, proceed, manager, options),
        (Propagation::Supports | Propagation::NotSupported | Propagation::Never, None) => {
            proceed.proceed()
        }
        (Propagation::NotSupported, Some(_)) => {
            tracing::debug!("{} suspends the current transaction", jp.signature());
            let _suspended = ContextGuard::push(None);
            proceed.proceed()
        }
        (Propagation::Mandatory, None) => Err(TransactionError::Mandatory(jp.signature()).into()),
        (Propagation::Never, Some(_)) => Err(TransactionError::Never(jp.signature()).into()),
    }
}

fn run_new(
    jp: &JoinPoint,
    proceed: Proceed<'_>,
    manager: &dyn TransactionManager,
    options: &TransactionOptions,
) -> InvocationResult {
    let transaction = ActiveTransaction::new(manager.begin(options)?);
    tracing::debug!("Began transaction for {}", jp.signature());

    let result = {
        let _context = ContextGuard::push(Some(transaction.clone()));
        proceed.proceed()
    };

    match result {
        Ok(value) => {
            transaction.with(|tx| tx.commit())?;
            tracing::debug!("Committed transaction for {}", jp.signature());
            Ok(value)
        }
        Err(e) => {
            if let Err(rollback) = transaction.with(|tx| tx.rollback()) {
                tracing::error!(
                    "Rollback for {} failed: {} (original error: {})",
                    jp.signature(),
                    rollback,
                    e
                );
            } else {
                tracing::debug!("Rolled back transaction for {}", jp.signature());
            }
            Err(e)
        }
    }
}
