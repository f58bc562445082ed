use std::rc::Rc;

use wikiweave_syntax::{AttrValue, Attribute, Tag, TagName, Token};

use crate::error::{ParseError, TransformError};
use crate::fetch::FetchError;
use crate::pipeline::{PipelineInput, PipelineKind, PipelineOptions, StageContext};
use crate::title::Title;
use crate::tokens::{contains_calls, placeholder};

use super::target::{self, Target};
use super::{NAME, arg_info, argument_options, encapsulate, functions};

enum State {
    ResolvingTarget,
    FunctionCall {
        name: String,
        arg: String,
        params: Vec<Attribute>,
    },
    CheckingLimits {
        title: Title,
        params: Vec<Attribute>,
    },
    FetchingSource {
        title: Title,
        params: Vec<Attribute>,
    },
    Expanding {
        title: Title,
        params: Vec<Attribute>,
        source: Rc<str>,
    },
    Encapsulating {
        content: Vec<Token>,
        function: Option<String>,
        href: Option<String>,
    },
    Done(Vec<Token>),
}

impl State {
    fn name(&self) -> &'static str {
        match self {
            State::ResolvingTarget => "ResolvingTarget",
            State::FunctionCall { .. } => "FunctionCall",
            State::CheckingLimits { .. } => "CheckingLimits",
            State::FetchingSource { .. } => "FetchingSource",
            State::Expanding { .. } => "Expanding",
            State::Encapsulating { .. } => "Encapsulating",
            State::Done(_) => "Done",
        }
    }
}

/// One `{{...}}` call on its way from token to expanded content.
pub struct Expansion {
    cx: StageContext,
    token: Token,
    tag: Tag,
    /// Reserved when the call is created, so ids follow document order.
    about: Option<String>,
}

impl Expansion {
    pub fn new(cx: StageContext, token: Token) -> Self {
        let tag = token
            .tag()
            .cloned()
            .unwrap_or_else(|| Tag::new(TagName::Template));
        let about = cx.options.wrap_templates.then(|| cx.parse.new_about_id());
        Self {
            cx,
            token,
            tag,
            about,
        }
    }

    pub async fn run(mut self) -> Result<Vec<Token>, TransformError> {
        let mut state = State::ResolvingTarget;
        loop {
            log::trace!("expansion {:?}: {}", self.tag.data.tsr, state.name());
            state = match state {
                State::ResolvingTarget => self.resolve_target().await?,
                State::FunctionCall { name, arg, params } => {
                    self.call_function(name, &arg, &params)
                }
                State::CheckingLimits { title, params } => self.check_limits(title, params),
                State::FetchingSource { title, params } => {
                    self.fetch_source(title, params).await
                }
                State::Expanding {
                    title,
                    params,
                    source,
                } => self.expand(title, params, source).await?,
                State::Encapsulating {
                    content,
                    function,
                    href,
                } => State::Done(self.encapsulate(content, function, href)),
                State::Done(tokens) => return Ok(tokens),
            };
        }
    }

    fn nested(&self, err: ParseError) -> TransformError {
        TransformError::nested(NAME, &self.token, err)
    }

    async fn expand_value(&self, value: &AttrValue) -> Result<AttrValue, TransformError> {
        match value {
            AttrValue::Tokens(tokens) if contains_calls(tokens) => {
                let expanded = self
                    .cx
                    .parse
                    .expand_tokens(
                        argument_options(&self.cx),
                        self.cx.frame.clone(),
                        tokens.clone(),
                    )
                    .await
                    .map_err(|err| self.nested(err))?;
                Ok(AttrValue::Tokens(expanded))
            }
            other => Ok(other.clone()),
        }
    }

    /// Expand the target and every parameter in the caller's frame, then
    /// decide what kind of call this is.
    async fn resolve_target(&self) -> Result<State, TransformError> {
        let mut attribs = Vec::with_capacity(self.tag.attribs.len());
        for attr in &self.tag.attribs {
            attribs.push(Attribute {
                key: self.expand_value(&attr.key).await?,
                value: self.expand_value(&attr.value).await?,
                src_offsets: attr.src_offsets,
            });
        }

        let Some((target, params)) = attribs.split_first() else {
            return Ok(State::Done(self.literal(&attribs).await?));
        };
        Ok(
            match target::resolve(&self.cx.parse, &target.key.to_tokens()) {
                Target::Function { name, arg } => State::FunctionCall {
                    name,
                    arg,
                    params: params.to_vec(),
                },
                Target::Template(title) => State::CheckingLimits {
                    title,
                    params: params.to_vec(),
                },
                Target::Unresolvable => State::Done(self.literal(&attribs).await?),
            },
        )
    }

    /// An unresolvable call, rendered back as wikitext around its expanded
    /// parts and run through the caller's pipeline options again.
    async fn literal(&self, attribs: &[Attribute]) -> Result<Vec<Token>, TransformError> {
        self.cx
            .parse
            .expand_tokens(self.cx.options, self.cx.frame.clone(), literal(attribs))
            .await
            .map_err(|err| self.nested(err))
    }

    fn call_function(&self, name: String, arg: &str, params: &[Attribute]) -> State {
        let content = match functions::call(&name, arg, params, &self.cx.parse) {
            Some(content) => content,
            None => {
                log::warn!("no implementation for parser function {name}");
                vec![Token::text(
                    format!("Parser function implementation for pf_{name} missing."),
                    None,
                )]
            }
        };
        State::Encapsulating {
            content,
            function: Some(name),
            href: None,
        }
    }

    fn check_limits(&self, title: Title, params: Vec<Attribute>) -> State {
        let max_depth = self.cx.parse.settings.max_depth;
        match self.cx.frame.loop_and_depth_check(&title.prefixed, max_depth) {
            Some(message) => {
                log::warn!("not expanding {}: {}", title.prefixed, message.trim());
                let link = Tag::element("a").with_attr("href", title.href());
                State::Encapsulating {
                    content: vec![
                        Token::text(message, None),
                        Token::TagOpen(link),
                        Token::text(title.prefixed.clone(), None),
                        Token::TagClose(Tag::element("a")),
                    ],
                    function: None,
                    href: Some(title.href()),
                }
            }
            None => State::FetchingSource { title, params },
        }
    }

    async fn fetch_source(&self, title: Title, params: Vec<Attribute>) -> State {
        let parse = &self.cx.parse;
        let name = title.prefixed.as_str();
        let result = match parse.cached_source(name) {
            Some(result) => result,
            None if !parse.settings.fetch_templates => {
                return State::Encapsulating {
                    content: placeholder(format!(
                        "Warning: Page/template fetching disabled, and no cache for {name}"
                    )),
                    function: None,
                    href: Some(title.href()),
                };
            }
            None => parse.fetch_source(name).await,
        };

        match result {
            Ok(source) => State::Expanding {
                title,
                params,
                source,
            },
            Err(FetchError::NotFound(_)) => State::Encapsulating {
                content: red_link(&title),
                function: None,
                href: Some(title.href()),
            },
            Err(err) => {
                log::warn!("fetching {name} failed: {err}");
                State::Encapsulating {
                    content: placeholder(format!("Error: could not fetch {name}: {err}")),
                    function: None,
                    href: Some(title.href()),
                }
            }
        }
    }

    /// Run the template body in a child frame holding the call's arguments.
    async fn expand(
        &self,
        title: Title,
        params: Vec<Attribute>,
        source: Rc<str>,
    ) -> Result<State, TransformError> {
        let frame = self.cx.frame.child(title.prefixed.clone(), params);
        let options = PipelineOptions {
            is_include: true,
            in_template: true,
            ..PipelineOptions::default()
        };
        let tokens = self
            .cx
            .parse
            .run_pipeline(
                PipelineKind::WikitextToTokens,
                options,
                frame,
                PipelineInput::Wikitext { source, offset: 0 },
            )
            .await
            .and_then(|output| output.into_tokens())
            .map_err(|err| self.nested(err))?;

        let keep_comments = self.cx.options.wrap_templates;
        let content = tokens
            .into_iter()
            .filter(|token| match token {
                Token::EndOfInput(_) => false,
                Token::Comment(_) => keep_comments,
                Token::SelfClose(tag) => {
                    !(tag.name.is_element("meta") && tag.has_type_of("mw:Placeholder"))
                }
                _ => true,
            })
            .map(Token::without_tsr)
            .collect();
        Ok(State::Encapsulating {
            content,
            function: None,
            href: Some(title.href()),
        })
    }

    fn encapsulate(
        &mut self,
        content: Vec<Token>,
        function: Option<String>,
        href: Option<String>,
    ) -> Vec<Token> {
        let Some(about) = self.about.take() else {
            return content;
        };
        let info = if self.cx.options.in_template {
            None
        } else {
            let info = arg_info::describe(&self.cx.parse, &self.tag, function, href);
            serde_json::to_string(&info).ok()
        };
        encapsulate(about, &self.tag, "mw:Transclusion", info, content)
    }
}

fn literal(attribs: &[Attribute]) -> Vec<Token> {
    let mut out = vec![Token::text("{{", None)];
    for (i, attr) in attribs.iter().enumerate() {
        if i > 0 {
            out.push(Token::text("|", None));
        }
        out.extend(attr.key.to_tokens());
        if i > 0 && !attr.key.is_empty() {
            out.push(Token::text("=", None));
        }
        out.extend(attr.value.to_tokens());
    }
    out.push(Token::text("}}", None));
    out
}

/// Link to a template that does not exist.
fn red_link(title: &Title) -> Vec<Token> {
    let link = Tag::element("a")
        .with_attr("rel", "mw:WikiLink")
        .with_attr("href", title.href())
        .with_attr("title", title.text())
        .with_attr("class", "new");
    vec![
        Token::TagOpen(link),
        Token::text(title.text(), None),
        Token::TagClose(Tag::element("a")),
    ]
}
