// Benchmark helper functions - Rust's dead code analysis doesn't understand
// that these are used by benchmark files in the same directory
// See: https://users.rust-lang.org/t/cargo-rustc-benches-awarnings/110111/2
#[allow(dead_code)]
pub fn generate_wikitext_content(size: usize) -> String {
    let base = "== Section ==\n\nParagraph with '''bold''', ''italic'' and a [[Link|link]].\n\n* Bullet point\n** Nested item\n* Another item\n\n{|\n|-\n| cell || {{echo|cell}}\n|}\n\n";
    base.repeat(size)
}

#[allow(dead_code)]
pub fn generate_nested_templates(depth: usize) -> Vec<(String, String)> {
    (0..depth)
        .map(|level| {
            let body = if level + 1 == depth {
                "leaf".to_string()
            } else {
                format!("[{{{{level{}|{{{{{{1}}}}}}}}}}]", level + 1)
            };
            (format!("Template:Level{level}"), body)
        })
        .collect()
}
