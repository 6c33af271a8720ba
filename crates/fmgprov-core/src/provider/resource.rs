//! Resource operation handlers.
//!
//! Each managed object type gets a [`ResourceHandler`]. Handlers receive the
//! shared [`Config`] by reference on every call and never own it.

use futures::future::BoxFuture;
use futures::FutureExt;
use serde_json::Value;
use tracing::debug;

use crate::api::{document_data, Document, Error, Method, ValidationError};
use crate::config::Config;

/// CRUD entry points for one object type.
///
/// Returns boxed futures so handlers can be stored as `Box<dyn ResourceHandler>`
/// in the provider's registry.
pub trait ResourceHandler: Send + Sync {
    fn type_name(&self) -> &str;

    fn create<'a>(
        &'a self,
        config: &'a Config,
        attrs: Document,
    ) -> BoxFuture<'a, Result<String, Error>>;

    /// `Ok(None)` when the object does not exist on the controller.
    fn read<'a>(
        &'a self,
        config: &'a Config,
        id: &'a str,
    ) -> BoxFuture<'a, Result<Option<Document>, Error>>;

    fn update<'a>(
        &'a self,
        config: &'a Config,
        id: &'a str,
        attrs: Document,
    ) -> BoxFuture<'a, Result<(), Error>>;

    fn delete<'a>(&'a self, config: &'a Config, id: &'a str) -> BoxFuture<'a, Result<(), Error>>;
}

/// A table-style object addressed as `<collection>/<key>`.
#[derive(Debug, Clone)]
pub struct ObjectResource {
    type_name: &'static str,
    /// Collection path; may contain `{adom}`.
    collection: &'static str,
    /// Attribute that identifies an entry (`name`, `userid`, ...).
    key: &'static str,
}

impl ObjectResource {
    pub const fn new(type_name: &'static str, collection: &'static str, key: &'static str) -> Self {
        Self {
            type_name,
            collection,
            key,
        }
    }

    pub fn collection(&self) -> &'static str {
        self.collection
    }

    pub fn key(&self) -> &'static str {
        self.key
    }

    fn object_path(&self, id: &str) -> String {
        format!("{}/{}", self.collection, encode_segment(id))
    }

    fn key_of(&self, attrs: &Document) -> Result<String, Error> {
        match attrs.get(self.key) {
            Some(Value::String(s)) if !s.is_empty() => Ok(s.clone()),
            Some(Value::Number(n)) => Ok(n.to_string()),
            _ => Err(ValidationError::InvalidSetting {
                name: self.key,
                reason: format!("{} requires a non-empty {:?} attribute", self.type_name, self.key),
            }
            .into()),
        }
    }
}

impl ResourceHandler for ObjectResource {
    fn type_name(&self) -> &str {
        self.type_name
    }

    fn create<'a>(
        &'a self,
        config: &'a Config,
        attrs: Document,
    ) -> BoxFuture<'a, Result<String, Error>> {
        async move {
            let id = self.key_of(&attrs)?;
            debug!(resource = self.type_name, id = %id, "Creating object");
            config
                .call(Method::Add, self.collection, Some(Value::Object(attrs)))
                .await?;
            Ok(id)
        }
        .boxed()
    }

    fn read<'a>(
        &'a self,
        config: &'a Config,
        id: &'a str,
    ) -> BoxFuture<'a, Result<Option<Document>, Error>> {
        async move {
            match config.call(Method::Get, &self.object_path(id), None).await {
                Ok(document) => Ok(match document_data(&document) {
                    Some(Value::Object(map)) => Some(map.clone()),
                    Some(Value::Array(items)) => items.first().and_then(Value::as_object).cloned(),
                    _ => None,
                }),
                Err(e) if e.is_not_found() => {
                    debug!(resource = self.type_name, id, "Object is gone");
                    Ok(None)
                }
                Err(e) => Err(e),
            }
        }
        .boxed()
    }

    fn update<'a>(
        &'a self,
        config: &'a Config,
        id: &'a str,
        attrs: Document,
    ) -> BoxFuture<'a, Result<(), Error>> {
        async move {
            config
                .call(Method::Update, &self.object_path(id), Some(Value::Object(attrs)))
                .await?;
            Ok(())
        }
        .boxed()
    }

    fn delete<'a>(&'a self, config: &'a Config, id: &'a str) -> BoxFuture<'a, Result<(), Error>> {
        async move {
            match config.call(Method::Delete, &self.object_path(id), None).await {
                Ok(_) => Ok(()),
                Err(e) if e.is_not_found() => Ok(()),
                Err(e) => Err(e),
            }
        }
        .boxed()
    }
}

/// Escape characters that would split a path segment.
fn encode_segment(id: &str) -> String {
    id.replace('%', "%25").replace('/', "\\/")
}
