//! Callable function and service types.

use std::fmt;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use serde_json::Value;

use crate::error::CallError;
use crate::schema::Schema;

/// Boxed future type for dyn-compatible async methods.
pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// The callable contract behind every function.
///
/// Cancellation is the caller dropping the returned future; deadlines are
/// applied by the invoking layer with `tokio::time::timeout`.
pub trait Handler: Send + Sync {
    fn call(&self, params: Value) -> BoxFuture<'_, Result<Value, CallError>>;
}

struct FnHandler<F>(F);

impl<F, Fut> Handler for FnHandler<F>
where
    F: Fn(Value) -> Fut + Send + Sync,
    Fut: Future<Output = Result<Value, CallError>> + Send + 'static,
{
    fn call(&self, params: Value) -> BoxFuture<'_, Result<Value, CallError>> {
        Box::pin((self.0)(params))
    }
}

/// A named, schema-described callable unit.
///
/// Cloning is cheap; clones share the same handler and schema.
#[derive(Clone)]
pub struct Function {
    name: String,
    schema: Option<Arc<dyn Schema>>,
    handler: Arc<dyn Handler>,
}

impl Function {
    pub fn new(
        name: impl Into<String>,
        schema: Option<Arc<dyn Schema>>,
        handler: Arc<dyn Handler>,
    ) -> Self {
        Self {
            name: name.into(),
            schema,
            handler,
        }
    }

    /// Build a function from an async closure.
    pub fn from_fn<F, Fut>(name: impl Into<String>, f: F) -> Self
    where
        F: Fn(Value) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<Value, CallError>> + Send + 'static,
    {
        Self::new(name, None, Arc::new(FnHandler(f)))
    }

    pub fn with_schema(mut self, schema: Arc<dyn Schema>) -> Self {
        self.schema = Some(schema);
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn schema(&self) -> Option<&Arc<dyn Schema>> {
        self.schema.as_ref()
    }

    pub async fn call(&self, params: Value) -> Result<Value, CallError> {
        self.handler.call(params).await
    }
}

impl fmt::Debug for Function {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Function")
            .field("name", &self.name)
            .field("has_schema", &self.schema.is_some())
            .finish()
    }
}

/// A named group of functions registered and resolved as one unit.
#[derive(Debug, Clone)]
pub struct Service {
    name: String,
    functions: Vec<Function>,
}

impl Service {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            functions: Vec::new(),
        }
    }

    pub fn with_function(mut self, function: Function) -> Self {
        self.functions.push(function);
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn functions(&self) -> &[Function] {
        &self.functions
    }

    /// Find a member function by name.
    pub fn function(&self, name: &str) -> Option<&Function> {
        self.functions.iter().find(|f| f.name() == name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn from_fn_invokes_closure() {
        let f = Function::from_fn("double", |params| async move {
            let n = params.as_i64().unwrap_or(0);
            Ok(Value::from(n * 2))
        });
        assert_eq!(f.name(), "double");
        let result = f.call(Value::from(21)).await.unwrap();
        assert_eq!(result, Value::from(42));
    }

    #[tokio::test]
    async fn service_lookup_by_name() {
        let svc = Service::new("math")
            .with_function(Function::from_fn("add", |_| async { Ok(Value::Null) }))
            .with_function(Function::from_fn("sub", |_| async { Ok(Value::Null) }));
        assert!(svc.function("add").is_some());
        assert!(svc.function("mul").is_none());
        assert_eq!(svc.functions().len(), 2);
    }
}
