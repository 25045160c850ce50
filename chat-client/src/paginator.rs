//! Stream paginator.
//!
//! A stream descriptor names a paged collection (a channel's messages, a
//! user's channels, ...). [`PageStream`] walks it lazily: the first request
//! carries no cursor, every following request carries the opaque
//! `nextCursor` of the previous response, and the sequence ends when the
//! server stops returning one.
//!
//! Response shape: `{"items": [...], "nextCursor": "<opaque>" | null}`.

use hyperchat_types::{CapabilityKind, EntityKind, EntityRef};
use serde_json::{Map, Value};

use crate::error::ClientError;
use crate::resolver::{Capability, Resolver};
use crate::transport::Transport;

/// One page of a stream. Items are already bound into the cache.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Page {
    /// Entities on this page, in server order.
    pub items: Vec<EntityRef>,
    /// More pages follow.
    pub has_more: bool,
}

/// Opens page streams over stream descriptors.
pub struct Paginator<T: Transport> {
    resolver: Resolver<T>,
    page_size: u32,
}

impl<T: Transport> Clone for Paginator<T> {
    fn clone(&self) -> Self {
        Self {
            resolver: self.resolver.clone(),
            page_size: self.page_size,
        }
    }
}

impl<T: Transport> Paginator<T> {
    /// Create a paginator requesting `page_size` items per page.
    pub fn new(resolver: Resolver<T>, page_size: u32) -> Self {
        Self {
            resolver,
            page_size,
        }
    }

    /// Start a fresh traversal of an entity's stream.
    ///
    /// No request is made until the first [`PageStream::next`].
    pub fn open(
        &self,
        entity: &EntityRef,
        stream: &str,
        item_kind: EntityKind,
        args: Value,
    ) -> Result<PageStream<T>, ClientError> {
        let capability = self
            .resolver
            .capability(entity, CapabilityKind::Stream, stream)?;
        Ok(PageStream {
            resolver: self.resolver.clone(),
            capability,
            item_kind,
            args: with_limit(args, self.page_size),
            cursor: None,
            finished: false,
        })
    }
}

/// A lazy, finite sequence of pages.
pub struct PageStream<T: Transport> {
    resolver: Resolver<T>,
    capability: Capability,
    item_kind: EntityKind,
    args: Value,
    cursor: Option<String>,
    finished: bool,
}

impl<T: Transport> PageStream<T> {
    /// Fetch the next page, or `None` once the last page was returned.
    ///
    /// A failed fetch leaves the stream where it was; calling again retries
    /// the same page.
    pub async fn next(&mut self) -> Result<Option<Page>, ClientError> {
        if self.finished {
            return Ok(None);
        }

        let request = self
            .capability
            .request(self.args.clone())
            .with_cursor(self.cursor.clone());
        let body = self.resolver.execute(request).await?;
        let (raw_items, next_cursor) = split_page(body)?;

        let items = raw_items
            .into_iter()
            .map(|item| self.resolver.bind(self.item_kind, item))
            .collect::<Result<Vec<_>, _>>()?;

        let has_more = next_cursor.is_some();
        self.cursor = next_cursor;
        self.finished = !has_more;

        Ok(Some(Page { items, has_more }))
    }

    /// Drain the stream, returning every item in order.
    pub async fn collect_all(mut self) -> Result<Vec<EntityRef>, ClientError> {
        let mut all = Vec::new();
        while let Some(page) = self.next().await? {
            all.extend(page.items);
        }
        Ok(all)
    }

    /// True once the last page was returned.
    pub fn is_finished(&self) -> bool {
        self.finished
    }

    /// The stream descriptor being walked.
    pub fn capability(&self) -> &Capability {
        &self.capability
    }
}

fn with_limit(args: Value, page_size: u32) -> Value {
    let mut args = match args {
        Value::Object(map) => map,
        Value::Null => Map::new(),
        // Non-object arguments are passed through untouched
        other => return other,
    };
    args.entry("limit").or_insert_with(|| Value::from(page_size));
    Value::Object(args)
}

fn split_page(body: Value) -> Result<(Vec<Value>, Option<String>), ClientError> {
    match body {
        // A bare array is a complete, single-page stream
        Value::Array(items) => Ok((items, None)),
        Value::Object(mut object) => {
            let items = match object.remove("items") {
                Some(Value::Array(items)) => items,
                other => {
                    return Err(ClientError::Protocol(format!(
                        "stream page has no item list: {:?}",
                        other
                    )))
                }
            };
            let next_cursor = match object.remove("nextCursor") {
                Some(Value::String(cursor)) if !cursor.is_empty() => Some(cursor),
                Some(Value::Number(n)) => Some(n.to_string()),
                _ => None,
            };
            Ok((items, next_cursor))
        }
        other => Err(ClientError::Protocol(format!(
            "stream page is not an object: {}",
            other
        ))),
    }
}
