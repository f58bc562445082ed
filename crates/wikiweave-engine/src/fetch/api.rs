use serde::Deserialize;
use std::collections::BTreeMap;

use super::{FetchError, PageSource};

#[derive(Debug, Deserialize)]
struct ApiResponse {
    query: Option<Query>,
}

#[derive(Debug, Deserialize)]
struct Query {
    #[serde(default)]
    normalized: Vec<Normalized>,
    pages: Option<Pages>,
}

#[derive(Debug, Deserialize)]
struct Normalized {
    to: String,
}

/// Classic responses key pages by id; `formatversion=2` returns a list.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum Pages {
    ById(BTreeMap<String, Page>),
    List(Vec<Page>),
}

#[derive(Debug, Deserialize)]
struct Page {
    title: Option<String>,
    missing: Option<serde_json::Value>,
    #[serde(default)]
    revisions: Vec<Revision>,
}

#[derive(Debug, Deserialize)]
struct Revision {
    revid: Option<u64>,
    #[serde(rename = "*")]
    content: Option<String>,
    slots: Option<Slots>,
    texthidden: Option<serde_json::Value>,
}

#[derive(Debug, Deserialize)]
struct Slots {
    main: Slot,
}

#[derive(Debug, Deserialize)]
struct Slot {
    #[serde(alias = "*")]
    content: Option<String>,
}

/// Decode a `action=query&prop=revisions` JSON response for `title`.
///
/// A page flagged `missing` or without revisions is [`FetchError::NotFound`];
/// hidden revision text is [`FetchError::AccessDenied`]; anything that does
/// not have the expected shape is [`FetchError::Malformed`].
pub fn decode_api_response(title: &str, body: &str) -> Result<PageSource, FetchError> {
    let response: ApiResponse =
        serde_json::from_str(body).map_err(|e| FetchError::Malformed(e.to_string()))?;
    let query = response
        .query
        .ok_or_else(|| FetchError::Malformed("Missing data.query".to_string()))?;

    let pages = match query.pages {
        Some(Pages::ById(pages)) => pages.into_values().collect(),
        Some(Pages::List(pages)) => pages,
        None => Vec::new(),
    };
    let page = pages
        .into_iter()
        .find(|p| p.missing.is_none() && !p.revisions.is_empty())
        .ok_or_else(|| FetchError::NotFound(title.to_string()))?;

    let normalized = query.normalized.into_iter().next().map(|n| n.to);
    let page_title = normalized
        .or(page.title)
        .unwrap_or_else(|| title.to_string());

    let Some(revision) = page.revisions.into_iter().next() else {
        return Err(FetchError::NotFound(title.to_string()));
    };
    if revision.texthidden.is_some() {
        return Err(FetchError::AccessDenied(format!("Source is hidden for {title}")));
    }
    let source = revision
        .content
        .or_else(|| revision.slots.and_then(|s| s.main.content))
        .ok_or_else(|| FetchError::Malformed(format!("No revision content for {title}")))?;

    Ok(PageSource {
        title: page_title,
        revision: revision.revid,
        source,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn decodes_classic_shape() {
        let body = r#"{"query":{"normalized":[{"from":"template:echo","to":"Template:Echo"}],
            "pages":{"42":{"pageid":42,"title":"Template:Echo",
            "revisions":[{"revid":7,"*":"{{{1}}}"}]}}}}"#;
        let page = decode_api_response("template:echo", body).unwrap();
        assert_eq!(
            page,
            PageSource {
                title: "Template:Echo".into(),
                revision: Some(7),
                source: "{{{1}}}".into(),
            }
        );
    }

    #[test]
    fn decodes_formatversion_two() {
        let body = r#"{"query":{"pages":[{"title":"Foo",
            "revisions":[{"revid":3,"slots":{"main":{"content":"hi"}}}]}]}}"#;
        let page = decode_api_response("Foo", body).unwrap();
        assert_eq!(page.source, "hi");
        assert_eq!(page.revision, Some(3));
    }

    #[test]
    fn missing_page_is_not_found() {
        let body = r#"{"query":{"pages":{"-1":{"title":"Nope","missing":""}}}}"#;
        assert_eq!(
            decode_api_response("Nope", body),
            Err(FetchError::NotFound("Nope".into()))
        );
    }

    #[test]
    fn hidden_text_is_access_denied() {
        let body = r#"{"query":{"pages":{"1":{"title":"X","revisions":[{"texthidden":""}]}}}}"#;
        assert!(matches!(
            decode_api_response("X", body),
            Err(FetchError::AccessDenied(_))
        ));
    }

    #[test]
    fn bad_shapes_are_malformed() {
        assert!(matches!(
            decode_api_response("X", "not json"),
            Err(FetchError::Malformed(_))
        ));
        assert!(matches!(
            decode_api_response("X", r#"{"error":"nope"}"#),
            Err(FetchError::Malformed(_))
        ));
        assert!(matches!(
            decode_api_response("X", r#"{"query":{"pages":{"1":{"revisions":[{"revid":1}]}}}}"#),
            Err(FetchError::Malformed(_))
        ));
    }
}
