// Transaction port: scope wrapped around a job by the transaction middleware

use crate::error::Result;
use async_trait::async_trait;
use std::any::Any;

/// An open transactional scope
#[async_trait]
pub trait Transaction: Send {
    /// Concrete scope, for adapters that hand their connection to tasks
    fn as_any_mut(&mut self) -> &mut (dyn Any + Send);

    /// Commit the transaction
    async fn commit(self: Box<Self>) -> Result<()>;

    /// Rollback the transaction
    async fn rollback(self: Box<Self>) -> Result<()>;
}

/// Opens transactional scopes
#[async_trait]
pub trait TransactionManager: Send + Sync {
    /// Begin a new transaction
    async fn begin(&self) -> Result<Box<dyn Transaction>>;
}

// ============================================================================
// Mock Implementations for Testing
// ============================================================================

pub mod mocks {
    use super::*;
    use std::sync::{Arc, Mutex, PoisonError};

    /// Records `begin`/`commit`/`rollback` in call order
    #[derive(Clone, Default)]
    pub struct RecordingTransactionManager {
        events: Arc<Mutex<Vec<&'static str>>>,
    }

    impl RecordingTransactionManager {
        pub fn new() -> Self {
            Self::default()
        }

        pub fn events(&self) -> Vec<&'static str> {
            self.events
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .clone()
        }

        fn record(&self, event: &'static str) {
            self.events
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .push(event);
        }
    }

    struct RecordingTransaction {
        manager: RecordingTransactionManager,
    }

    #[async_trait]
    impl Transaction for RecordingTransaction {
        fn as_any_mut(&mut self) -> &mut (dyn Any + Send) {
            self
        }

        async fn commit(self: Box<Self>) -> Result<()> {
            self.manager.record("commit");
            Ok(())
        }

        async fn rollback(self: Box<Self>) -> Result<()> {
            self.manager.record("rollback");
            Ok(())
        }
    }

    #[async_trait]
    impl TransactionManager for RecordingTransactionManager {
        async fn begin(&self) -> Result<Box<dyn Transaction>> {
            self.record("begin");
            Ok(Box::new(RecordingTransaction {
                manager: self.clone(),
            }))
        }
    }
}
