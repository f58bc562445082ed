use wikiweave_syntax::{Token, TokenizeError};

/// A transformer failed on a token. Fatal for the pipeline that ran it.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
#[error("{transformer} failed on {token}: {message}")]
pub struct TransformError {
    pub transformer: &'static str,
    /// Debug rendering of the offending token.
    pub token: String,
    pub message: String,
}

impl TransformError {
    pub fn new(transformer: &'static str, token: &Token, message: impl Into<String>) -> Self {
        Self {
            transformer,
            token: format!("{token:?}"),
            message: message.into(),
        }
    }

    /// Wrap the failure of a nested pipeline run on behalf of `transformer`.
    pub fn nested(transformer: &'static str, token: &Token, source: ParseError) -> Self {
        match source {
            ParseError::Transform(inner) => inner,
            other => Self::new(transformer, token, other.to_string()),
        }
    }
}

/// The single terminal failure of a parse.
#[derive(Debug, thiserror::Error)]
pub enum ParseError {
    #[error("Tokenizer error: {0}")]
    Tokenize(#[from] TokenizeError),
    #[error("Transform error: {0}")]
    Transform(#[from] TransformError),
    #[error("Runtime error: {0}")]
    Runtime(String),
}

impl From<std::io::Error> for ParseError {
    fn from(err: std::io::Error) -> Self {
        ParseError::Runtime(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn nested_keeps_the_innermost_transform_error() {
        let token = Token::text("x", None);
        let inner = TransformError::new("ListHandler", &token, "boom");
        let outer = TransformError::nested(
            "TemplateHandler",
            &token,
            ParseError::Transform(inner.clone()),
        );
        assert_eq!(outer, inner);
    }

    #[test]
    fn nested_wraps_other_failures() {
        let token = Token::text("x", None);
        let err = TransformError::nested(
            "TemplateHandler",
            &token,
            ParseError::Tokenize(TokenizeError::Stalled { pos: 3 }),
        );
        assert_eq!(err.transformer, "TemplateHandler");
        assert!(err.message.contains("byte 3"));
    }
}
