//! Repository trait for the scoped key/value configuration store.

use async_trait::async_trait;

use crate::{Error, config::ConfigScope};

/// Raw access to scoped configuration values.
///
/// Values are stored as text exactly as an operator entered them; typing and
/// inheritance are the job of [`ConfigResolver`](crate::config::ConfigResolver).
#[async_trait]
pub trait ConfigRepository: Send + Sync + 'static {
    /// Read the value stored at `path` for exactly this scope, without inheritance.
    async fn read(&self, path: &str, scope: ConfigScope) -> Result<Option<String>, Error>;

    /// Write a value, replacing any existing one at the same path and scope.
    async fn write(&self, path: &str, value: &str, scope: ConfigScope) -> Result<(), Error>;

    /// Write a value only if none is stored at the same path and scope. A blank
    /// stored value counts as none.
    ///
    /// # Returns
    ///
    /// `true` if this call stored the value.
    async fn write_if_absent(
        &self,
        path: &str,
        value: &str,
        scope: ConfigScope,
    ) -> Result<bool, Error>;

    /// Remove a value so the scope inherits again.
    async fn delete(&self, path: &str, scope: ConfigScope) -> Result<(), Error>;
}
