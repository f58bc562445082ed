use wikiweave_syntax::{Rank, Tag, TagName, Token};

use crate::error::TransformError;
use crate::pipeline::{Registration, StageContext, TokenFilter, TransformOutcome, Transformer};

/// `__NOTOC__` and friends become page-property metas.
#[derive(Debug)]
pub struct BehaviorSwitchHandler;

impl Transformer for BehaviorSwitchHandler {
    fn name(&self) -> &'static str {
        "BehaviorSwitchHandler"
    }

    fn registrations(&self) -> Vec<Registration> {
        vec![Registration::new(
            Rank::from_millis(140),
            TokenFilter::Tag(TagName::BehaviorSwitch),
        )]
    }

    fn apply(
        &mut self,
        token: Token,
        _rank: Rank,
        _cx: &StageContext,
    ) -> Result<TransformOutcome, TransformError> {
        let Some(tag) = token.tag() else {
            return Ok(TransformOutcome::Pass(token));
        };
        let magic = tag.attr_string("magic").unwrap_or_default();
        let mut meta = Tag::element("meta").with_attr(
            "property",
            format!("mw:PageProp/{}", magic.to_lowercase()),
        );
        meta.data.tsr = tag.data.tsr;
        meta.data.src = tag.data.src.clone();
        Ok(TransformOutcome::Emit(vec![Token::SelfClose(meta)]))
    }
}
