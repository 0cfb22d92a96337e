//! Attribute macros running an `async fn` on a fresh weft runtime.

mod utils;

use proc_macro::TokenStream;

/// Runs an `async fn main` on a new runtime, blocking until it completes.
///
/// Accepts `worker_threads = n` and `thread_name = "..."`.
///
/// ```rust,ignore
/// #[weft::main(worker_threads = 4)]
/// async fn main() {
///     weft::task::spawn(async { /* ... */ });
/// }
/// ```
///
/// The generated `main` panics if the root task is cancelled or fails.
#[proc_macro_attribute]
pub fn main(attr: TokenStream, item: TokenStream) -> TokenStream {
    expand(attr, item, "main task", false)
}

/// Turns an `async fn` into a `#[test]` running on a new runtime.
///
/// Accepts the same options as [`main`](macro@main). The test fails if its
/// root task is cancelled or fails.
#[proc_macro_attribute]
pub fn test(attr: TokenStream, item: TokenStream) -> TokenStream {
    expand(attr, item, "test task", true)
}

fn expand(attr: TokenStream, item: TokenStream, label: &str, is_test: bool) -> TokenStream {
    let result = utils::parse_options(attr).and_then(|options| {
        let (tokens, pos) = utils::strip_async(item)?;
        utils::wrap_body(tokens, pos, &options, label)
    });

    let tokens = match result {
        Ok(tokens) => tokens,
        Err(message) => return utils::compile_error(&message),
    };

    let mut out = TokenStream::new();

    if is_test {
        out.extend("#[::core::prelude::v1::test]".parse::<TokenStream>());
    }

    out.extend(tokens);
    out
}
