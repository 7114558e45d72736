//! Lazy, paginated bucket listing

use futures::stream::{self, BoxStream, StreamExt, TryStreamExt};

use crate::error::{Error, Result};
use crate::traits::{ObjectDescriptor, ObjectStore};

enum Cursor {
    Start,
    Next(String),
    Done,
}

/// Stream every object in `bucket`, one page in memory at a time
///
/// The listing can only restart from the beginning; there is no cursor
/// that survives a process restart.
pub fn list_objects<'a>(
    store: &'a dyn ObjectStore,
    bucket: &'a str,
) -> BoxStream<'a, Result<ObjectDescriptor>> {
    stream::try_unfold(Cursor::Start, move |cursor| async move {
        let token = match cursor {
            Cursor::Start => None,
            Cursor::Next(token) => Some(token),
            Cursor::Done => return Ok::<_, Error>(None),
        };

        let page = store.list_page(bucket, token).await?;
        tracing::debug!(bucket, objects = page.objects.len(), "Listed page");

        let next = match page.next_token {
            Some(token) if !token.is_empty() => Cursor::Next(token),
            _ => Cursor::Done,
        };

        let objects = stream::iter(page.objects.into_iter().map(Ok::<_, Error>));
        Ok(Some((objects, next)))
    })
    .try_flatten()
    .boxed()
}
