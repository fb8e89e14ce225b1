/*
 * transforms/content.rs
 * Copyright (c) 2025 Posit, PBC
 *
 * Abstract reflow.
 */

use crate::frontmatter;
use crate::registry::ModuleFactory;
use crate::transform::{ModuleContext, TransformModule};
use crate::Result;

pub(crate) fn factories() -> Vec<ModuleFactory> {
    vec![ModuleFactory {
        name: ProcessAbstract::NAME,
        family: "content",
        accepted_args: &[],
        build: |_| Ok(Box::new(ProcessAbstract)),
    }]
}

/// Joins the wrapped continuation lines of the front matter `abstract`
/// entry into one line.
///
/// Plain scalars are joined onto the key line. Block scalars (`|`, `>`)
/// keep their indicator and get a single continuation line indented by
/// one space. The first unindented line after the entry gains a
/// preceding blank line.
pub struct ProcessAbstract;

impl ProcessAbstract {
    pub const NAME: &'static str = "ProcessAbstract";
}

fn is_indented(line: &str) -> bool {
    line.starts_with([' ', '\t']) && !line.trim().is_empty()
}

fn reflow(yaml: &str) -> Option<String> {
    let lines: Vec<&str> = yaml.lines().collect();
    let key_index = lines.iter().position(|l| l.starts_with("abstract:"))?;
    let continuation: Vec<&str> = lines[key_index + 1..]
        .iter()
        .take_while(|l| is_indented(l))
        .map(|l| l.trim())
        .collect();
    if continuation.is_empty() {
        return None;
    }
    let joined = continuation.join(" ");
    let key_line = lines[key_index].trim_end();
    let value = key_line["abstract:".len()..].trim();

    let mut out: Vec<String> = lines[..key_index].iter().map(|l| l.to_string()).collect();
    if value.starts_with(['|', '>']) {
        out.push(key_line.to_string());
        out.push(format!(" {}", joined));
    } else if value.is_empty() {
        out.push(format!("abstract: {}", joined));
    } else {
        out.push(format!("abstract: {} {}", value, joined));
    }

    let rest = &lines[key_index + 1 + continuation.len()..];
    if let Some(first) = rest.first()
        && !first.trim().is_empty()
    {
        out.push(String::new());
    }
    out.extend(rest.iter().map(|l| l.to_string()));

    let mut text = out.join("\n");
    text.push('\n');
    Some(text)
}

impl TransformModule for ProcessAbstract {
    fn name(&self) -> &str {
        Self::NAME
    }

    fn process(&self, input: &str, _ctx: &ModuleContext<'_>) -> Result<String> {
        let Some(split) = frontmatter::split(input) else {
            return Ok(input.to_string());
        };
        Ok(match reflow(split.frontmatter) {
            Some(yaml) => split.rebuild(&yaml, split.body),
            None => input.to_string(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transforms::test_support::run;

    #[test]
    fn test_plain_scalar_joined() {
        let input = "---\ntitle: T\nabstract: This is\n  a wrapped\n  abstract.\nauthor: A\n---\nBody\n";
        assert_eq!(
            run(&ProcessAbstract, input),
            "---\ntitle: T\nabstract: This is a wrapped abstract.\n\nauthor: A\n---\nBody\n"
        );
    }

    #[test]
    fn test_block_scalar_single_line() {
        let input = "---\nabstract: >\n    First line\n    second line\n---\n";
        assert_eq!(
            run(&ProcessAbstract, input),
            "---\nabstract: >\n First line second line\n---\n"
        );
    }

    #[test]
    fn test_result_is_still_valid_yaml() {
        let input = "---\nabstract: |\n  One\n  two\nkeywords: [x]\n---\n";
        let output = run(&ProcessAbstract, input);
        let split = frontmatter::split(&output).unwrap();
        let map = frontmatter::parse_mapping(split.frontmatter).unwrap();
        assert_eq!(
            frontmatter::get(&map, "abstract").and_then(|v| v.as_str()),
            Some("One two\n")
        );
    }

    #[test]
    fn test_identity_without_continuation() {
        for input in [
            "---\nabstract: Short.\ntitle: T\n---\n",
            "---\ntitle: T\n---\nabstract:\n  not front matter\n",
            "no front matter\n",
        ] {
            assert_eq!(run(&ProcessAbstract, input), input);
        }
    }

    #[test]
    fn test_second_pass_is_identity() {
        let input = "---\nabstract: a\n  b\nnext: 1\n---\n";
        let once = run(&ProcessAbstract, input);
        assert_eq!(run(&ProcessAbstract, &once), once);
    }
}
