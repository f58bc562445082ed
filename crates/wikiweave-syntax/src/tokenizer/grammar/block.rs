//! Start-of-line constructs.

use crate::token::{Attribute, Syntax, Tag, TagName, Token};

use super::attributes::{self, AttrContext};
use super::inline;
use super::{Grammar, Stops, push_text};
use crate::tokenizer::{NoMatch, Rule};

/// Try the constructs that only exist at the start of a line.
///
/// Consumes nothing when none applies. Headings and table lines consume
/// the rest of their line; list bullets and rules leave the remainder for
/// the inline grammar.
pub(crate) fn sol_construct(p: &mut Grammar<'_, '_>, stops: Stops, out: &mut Vec<Token>) {
    match p.peek_byte() {
        Some(b'=') => {
            heading(p, out);
        }
        Some(b'-') if p.at("----") => horizontal_rule(p, out),
        Some(b'*' | b'#' | b':' | b';') => list_item(p, out),
        Some(b'{') if p.at("{|") && !stops.in_call() => table_start(p, out),
        Some(b'|') if p.table_depth > 0 && !stops.in_call() => table_line(p, out),
        Some(b'!') if p.table_depth > 0 && !stops.in_call() => header_cells(p, out),
        _ => {}
    }
}

fn heading(p: &mut Grammar<'_, '_>, out: &mut Vec<Token>) -> bool {
    let start = p.pos;
    let line_end = p.line_end();
    let line = p.slice(start, line_end);
    let body_len = line.trim_end_matches([' ', '\t']).len();
    let body = &line[..body_len];

    let lead = body.bytes().take_while(|b| *b == b'=').count();
    let level = if lead == body.len() {
        // A line of nothing but `=`: the middle ones are the title.
        if lead < 3 {
            return false;
        }
        ((lead - 1) / 2).min(6)
    } else {
        let trail = body.bytes().rev().take_while(|b| *b == b'=').count();
        if trail == 0 {
            return false;
        }
        lead.min(trail).min(6)
    };

    let name = format!("h{level}");
    let open_end = start + level;
    let close_start = start + body_len - level;

    out.push(Token::TagOpen(
        Tag::element(&name).with_tsr(Some(p.range(start, open_end))),
    ));
    p.pos = open_end;
    p.with_limit(close_start, |p| {
        inline::inline_line(p, Stops::default(), out);
    });
    p.pos = close_start + level;
    out.push(Token::TagClose(
        Tag::element(&name).with_tsr(Some(p.range(close_start, p.pos))),
    ));

    if p.pos < line_end {
        let trailing = p.slice(p.pos, line_end);
        push_text(out, trailing, p.range(p.pos, line_end));
        p.pos = line_end;
    }
    true
}

fn horizontal_rule(p: &mut Grammar<'_, '_>, out: &mut Vec<Token>) {
    let start = p.pos;
    while p.at("-") {
        p.bump(1);
    }
    out.push(Token::SelfClose(
        Tag::element("hr").with_tsr(Some(p.range(start, p.pos))),
    ));
}

fn list_item(p: &mut Grammar<'_, '_>, out: &mut Vec<Token>) {
    let start = p.pos;
    while matches!(p.peek_byte(), Some(b'*' | b'#' | b':' | b';')) {
        p.bump(1);
    }
    let bullets = p.slice(start, p.pos);
    let tag = Tag::new(TagName::ListItem)
        .with_attr("bullets", bullets)
        .with_tsr(Some(p.range(start, p.pos)));
    out.push(Token::SelfClose(tag));
}

fn table_start(p: &mut Grammar<'_, '_>, out: &mut Vec<Token>) {
    let start = p.pos;
    let line_end = p.line_end();
    p.bump(2);
    let attribs = p.with_limit(line_end, |p| {
        attributes::attribute_list(p, AttrContext::Table)
    });
    p.pos = line_end;

    let mut tag = Tag::element("table").with_tsr(Some(p.range(start, line_end)));
    tag.attribs = attribs;
    out.push(Token::TagOpen(tag));
    p.table_depth += 1;
}

fn table_line(p: &mut Grammar<'_, '_>, out: &mut Vec<Token>) {
    let start = p.pos;
    if p.at("|}") {
        p.bump(2);
        p.table_depth = p.table_depth.saturating_sub(1);
        out.push(Token::TagClose(
            Tag::element("table").with_tsr(Some(p.range(start, p.pos))),
        ));
    } else if p.at("|-") {
        let line_end = p.line_end();
        p.bump(1);
        while p.at("-") {
            p.bump(1);
        }
        let attribs = p.with_limit(line_end, |p| {
            attributes::attribute_list(p, AttrContext::Table)
        });
        p.pos = line_end;
        let mut tag = Tag::element("tr").with_tsr(Some(p.range(start, line_end)));
        tag.attribs = attribs;
        out.push(Token::TagOpen(tag));
    } else if p.at("|+") {
        cell(p, "caption", 2, None, Stops::default(), out);
    } else {
        let marker = if p.at("||") { 2 } else { 1 };
        let stops = Stops {
            table_cell: true,
            ..Stops::default()
        };
        cell(p, "td", marker, None, stops, out);
        while p.at("||") {
            cell(p, "td", 2, Some(Syntax::Row), stops, out);
        }
    }
}

fn header_cells(p: &mut Grammar<'_, '_>, out: &mut Vec<Token>) {
    let stops = Stops {
        header_cell: true,
        ..Stops::default()
    };
    cell(p, "th", 1, None, stops, out);
    while p.at("!!") || p.at("||") {
        cell(p, "th", 2, Some(Syntax::Row), stops, out);
    }
}

/// One cell: marker, optional `attrs |`, content up to the next cell marker.
fn cell(
    p: &mut Grammar<'_, '_>,
    name: &str,
    marker: usize,
    stx: Option<Syntax>,
    stops: Stops,
    out: &mut Vec<Token>,
) {
    let start = p.pos;
    p.bump(marker);
    let attribs = p.attempt(cell_args).unwrap_or_default();

    let mut tag = Tag::element(name).with_tsr(Some(p.range(start, p.pos)));
    tag.attribs = attribs;
    tag.data.stx = stx;
    out.push(Token::TagOpen(tag));

    inline::inline_line(p, stops, out);
}

/// `attrs |` in front of cell content. A `||` is a cell separator, not the
/// end of the arguments.
fn cell_args(p: &mut Grammar<'_, '_>) -> Result<Vec<Attribute>, NoMatch> {
    let line_end = p.line_end();
    let attribs = p.with_limit(line_end, |p| {
        attributes::attribute_list(p, AttrContext::Table)
    });
    if p.at("|") && !p.at("||") {
        p.bump(1);
        Ok(attribs)
    } else {
        Err(p.no_match(Rule::TableAttributes))
    }
}
