use proc_macro::{Delimiter, Group, TokenStream, TokenTree};

/// Runtime options accepted by `#[weft::main(...)]` and `#[weft::test(...)]`.
#[derive(Default)]
pub(crate) struct Options {
    pub(crate) worker_threads: Option<usize>,
    pub(crate) thread_name: Option<String>,
}

impl Options {
    /// Builder chain constructing the runtime, as source text.
    pub(crate) fn builder_expr(&self) -> String {
        let mut builder = String::from("::weft::RuntimeBuilder::new()");

        if let Some(n) = self.worker_threads {
            builder.push_str(&format!(".worker_threads({n})"));
        }

        if let Some(name) = &self.thread_name {
            builder.push_str(&format!(".thread_name({name:?})"));
        }

        builder.push_str(".build().expect(\"failed to build the weft runtime\")");
        builder
    }
}

/// Splits a `TokenStream` on top-level commas.
fn split_args(input: TokenStream) -> Vec<Vec<TokenTree>> {
    let mut args = Vec::new();
    let mut current = Vec::new();

    for token in input {
        match &token {
            TokenTree::Punct(p) if p.as_char() == ',' => {
                if !current.is_empty() {
                    args.push(std::mem::take(&mut current));
                }
            }
            _ => current.push(token),
        }
    }

    if !current.is_empty() {
        args.push(current);
    }

    args
}

/// Parses `key = value` pairs.
pub(crate) fn parse_options(attr: TokenStream) -> Result<Options, String> {
    let mut options = Options::default();

    for arg in split_args(attr) {
        let [TokenTree::Ident(key), TokenTree::Punct(eq), TokenTree::Literal(value)] = &arg[..]
        else {
            return Err("expected `key = value`".to_owned());
        };

        if eq.as_char() != '=' {
            return Err(format!("expected `=` after `{key}`"));
        }

        let value = value.to_string();

        match key.to_string().as_str() {
            "worker_threads" => {
                let n = value
                    .parse::<usize>()
                    .map_err(|_| format!("`worker_threads` must be an integer, got `{value}`"))?;

                if n == 0 {
                    return Err("`worker_threads` must be > 0".to_owned());
                }

                options.worker_threads = Some(n);
            }
            "thread_name" => options.thread_name = Some(parse_thread_name(&value)?),
            other => return Err(format!("unknown option `{other}`")),
        }
    }

    Ok(options)
}

/// Reads the source text of a plain string literal.
///
/// Raw strings and escape sequences are rejected, so the name can be
/// re-emitted with `{:?}` unchanged.
fn parse_thread_name(literal: &str) -> Result<String, String> {
    if literal.starts_with('r') || literal.starts_with('b') || literal.starts_with('c') {
        return Err("`thread_name` must be a plain string literal, not a raw, byte or C string".to_owned());
    }

    let name = literal
        .strip_prefix('"')
        .and_then(|v| v.strip_suffix('"'))
        .ok_or_else(|| "`thread_name` must be a string literal".to_owned())?;

    if name.contains('\\') {
        return Err("`thread_name` must not contain escape sequences".to_owned());
    }

    Ok(name.to_owned())
}

/// Removes the `async` keyword of an `async fn` and returns the remaining
/// tokens with the position of the body block.
pub(crate) fn strip_async(item: TokenStream) -> Result<(Vec<TokenTree>, usize), String> {
    let mut tokens: Vec<TokenTree> = item.into_iter().collect();

    let Some(async_pos) = tokens
        .iter()
        .position(|t| matches!(t, TokenTree::Ident(id) if id.to_string() == "async"))
    else {
        return Err("the `async` keyword is missing from the function declaration".to_owned());
    };

    tokens.remove(async_pos);

    let Some(body_pos) = tokens
        .iter()
        .rposition(|t| matches!(t, TokenTree::Group(g) if g.delimiter() == Delimiter::Brace))
    else {
        return Err("expected a function body".to_owned());
    };

    Ok((tokens, body_pos))
}

/// Replaces the body at `pos` with `block_on` of the original body.
pub(crate) fn wrap_body(
    mut tokens: Vec<TokenTree>,
    pos: usize,
    options: &Options,
    label: &str,
) -> Result<Vec<TokenTree>, String> {
    let TokenTree::Group(group) = &tokens[pos] else {
        return Err("expected a function body".to_owned());
    };

    let body = group.stream();

    let new_body = format!(
        "{{
            let runtime = {builder};
            match runtime.block_on(async move {{ {body} }}) {{
                ::core::result::Result::Ok(value) => value,
                ::core::result::Result::Err(err) => ::core::panic!(\"{label} did not complete: {{}}\", err),
            }}
        }}",
        builder = options.builder_expr(),
    );

    let stream: TokenStream = new_body.parse().map_err(|err| format!("{err}"))?;
    tokens[pos] = TokenTree::Group(Group::new(Delimiter::Brace, stream));

    Ok(tokens)
}

/// Reports `message` at the macro call site.
pub(crate) fn compile_error(message: &str) -> TokenStream {
    format!("::core::compile_error!({message:?});")
        .parse()
        .unwrap_or_default()
}
