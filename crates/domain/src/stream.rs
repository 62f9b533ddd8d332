use std::pin::Pin;

/// A boxed async stream, used for provider token output.
pub type BoxStream<'a, T> = Pin<Box<dyn futures_core::Stream<Item = T> + Send + 'a>>;

/// What the core sees from a provider: decoded text chunks until the
/// stream ends. Wire parsing (SSE, line-delimited JSON) belongs to each
/// adapter.
pub type TokenStream = BoxStream<'static, crate::Result<String>>;
