//! Command parser: splits control-file text into logical lines and each
//! line into keyword, value and trailing comment.
//!
//! Line format: `Command Keyword == value  ! comment`. `!` and `#` start a
//! comment outside double quotes. A value ending in `|` continues on the
//! next physical line.

use crate::ast::{collapse_whitespace, Command, Directive, Line, Provenance};
use crate::error::ParseError;
use crate::scope::{Scope, ScopeKind};

/// The command/value separator.
pub const SEPARATOR: &str = "==";

/// Code part and trailing comment of one physical line.
fn split_code_comment(text: &str) -> Result<(&str, Option<&str>), &'static str> {
    let mut in_quote = false;
    for (i, c) in text.char_indices() {
        match c {
            '"' => in_quote = !in_quote,
            '!' | '#' if !in_quote => return Ok((&text[..i], Some(&text[i..]))),
            _ => {}
        }
    }
    if in_quote {
        return Err("unterminated quote");
    }
    Ok((text, None))
}

/// Byte offset of the first separator outside quotes.
fn find_separator(code: &str) -> Option<usize> {
    let bytes = code.as_bytes();
    let mut in_quote = false;
    let mut i = 0;
    while i < bytes.len() {
        match bytes[i] {
            b'"' => in_quote = !in_quote,
            b'=' if !in_quote && bytes.get(i + 1) == Some(&b'=') => return Some(i),
            _ => {}
        }
        i += 1;
    }
    None
}

fn leading_whitespace(text: &str) -> &str {
    let trimmed = text.trim_start();
    &text[..text.len() - trimmed.len()]
}

/// Build a command from its code part and trailing comment.
fn build_command(raw: String, code: &str, comment: Option<&str>, prov: Provenance) -> Command {
    let indent = leading_whitespace(&raw).to_string();
    let (lhs, rhs) = match find_separator(code) {
        Some(pos) => (
            collapse_whitespace(&code[..pos]),
            Some(code[pos + SEPARATOR.len()..].trim().to_string()),
        ),
        None => (collapse_whitespace(code), None),
    };
    Command {
        raw,
        indent,
        lhs,
        rhs,
        comment: comment.map(|c| c.trim_end().to_string()),
        prov,
    }
}

/// Parse a single logical line (already continuation-joined).
pub fn parse_command(text: &str, filename: &str, line: u32) -> Result<Command, ParseError> {
    let (code, comment) =
        split_code_comment(text).map_err(|m| ParseError::lex(filename, line, m))?;
    let prov = Provenance {
        file: filename.to_owned(),
        line,
    };
    Ok(build_command(text.to_string(), code, comment, prov))
}

/// Split a control file into logical lines and classify each one.
pub fn lex(src: &str, filename: &str) -> Result<Vec<Line>, ParseError> {
    let physical: Vec<&str> = src.lines().collect();
    let mut out = Vec::new();
    let mut i = 0usize;

    while i < physical.len() {
        let line_no = (i + 1) as u32;
        let first = physical[i].trim_end_matches('\r');
        let (code, comment) =
            split_code_comment(first).map_err(|m| ParseError::lex(filename, line_no, m))?;

        let mut raw = first.to_string();
        let mut code = code.to_string();
        let mut comment = comment.map(str::to_string);
        i += 1;

        // Continuation: a value ending with `|` carries on to the next line.
        while code.trim_end().ends_with('|')
            && find_separator(&code).is_some()
            && i < physical.len()
        {
            let next = physical[i].trim_end_matches('\r');
            let (next_code, next_comment) = split_code_comment(next)
                .map_err(|m| ParseError::lex(filename, (i + 1) as u32, m))?;
            if next_code.trim().is_empty() {
                break;
            }
            code = format!("{} {}", code.trim_end(), next_code.trim());
            if next_comment.is_some() {
                comment = next_comment.map(str::to_string);
            }
            raw.push('\n');
            raw.push_str(next);
            i += 1;
        }

        let prov = Provenance {
            file: filename.to_owned(),
            line: line_no,
        };
        let command = build_command(raw, &code, comment.as_deref(), prov);
        let directive = classify(&command)?;
        out.push(Line { command, directive });
    }

    Ok(out)
}

/// Recognise structural keywords. Returns `None` for ordinary commands.
pub fn classify(cmd: &Command) -> Result<Option<Directive>, ParseError> {
    if cmd.is_comment_line() {
        return Ok(None);
    }
    let mut kw = cmd.keyword();
    if let Some(rest) = kw.strip_prefix("elseif ") {
        kw = format!("else if {}", rest);
    }
    let rhs = cmd.rhs.as_deref().map(str::trim).unwrap_or("");

    let condition = |rest: &str| -> Result<Option<Scope>, ParseError> {
        let mut words = rest.splitn(2, ' ');
        let kind = match words.next().and_then(ScopeKind::from_condition_word) {
            Some(k) => k,
            None => return Ok(None),
        };
        if rhs.is_empty() {
            return Err(ParseError::structure(
                &cmd.prov.file,
                cmd.prov.line,
                format!("'{}' has no condition value", cmd.lhs),
            ));
        }
        if kind == ScopeKind::Variable {
            let name = cmd.lhs.split(' ').skip_while(|w| !w.eq_ignore_ascii_case("variable")).nth(1);
            return match name {
                Some(name) => Ok(Some(Scope::variable(name, rhs))),
                None => Err(ParseError::structure(
                    &cmd.prov.file,
                    cmd.prov.line,
                    "'If Variable' requires a variable name",
                )),
            };
        }
        Ok(Some(Scope::from_expr(kind, rhs)))
    };

    if let Some(rest) = kw.strip_prefix("else if ") {
        return Ok(condition(rest)?.map(Directive::ElseIf));
    }
    if let Some(rest) = kw.strip_prefix("if ") {
        return Ok(condition(rest)?.map(Directive::If));
    }

    let directive = match kw.as_str() {
        "else" if cmd.rhs.is_none() => Some(Directive::Else),
        "end if" => Some(Directive::EndIf),
        "end define" => Some(Directive::EndDefine),
        "start 1d domain" | "start 1d" => Some(Directive::StartDomain),
        "end 1d domain" | "end domain" | "end 1d" => Some(Directive::EndDomain),
        "define event" => Some(Directive::Define(Scope::from_expr(
            ScopeKind::EventVariable,
            rhs,
        ))),
        "define output zone" | "define map output zone" => Some(Directive::Define(
            Scope::from_expr(ScopeKind::OutputZone, rhs),
        )),
        "define control" => Some(Directive::Define(Scope::from_expr(
            ScopeKind::Control,
            rhs,
        ))),
        _ => None,
    };
    Ok(directive)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn splits_command_value_and_comment() {
        let c = parse_command("  Read   GIS Code == gis\\2d_code.shp  ! active area", "m.tgc", 4)
            .unwrap();
        assert_eq!(c.lhs, "Read GIS Code");
        assert_eq!(c.rhs.as_deref(), Some("gis\\2d_code.shp"));
        assert_eq!(c.comment.as_deref(), Some("! active area"));
        assert_eq!(c.indent, "  ");
        assert_eq!(c.prov.line, 4);
    }

    #[test]
    fn separator_inside_quotes_is_not_a_split() {
        let c = parse_command("Set Variable X == \"a == b ! c\"", "m.tcf", 1).unwrap();
        assert_eq!(c.lhs, "Set Variable X");
        assert_eq!(c.rhs.as_deref(), Some("\"a == b ! c\""));
        assert!(c.comment.is_none());
        assert_eq!(c.unquoted_rhs(), Some("a == b ! c"));
    }

    #[test]
    fn unterminated_quote_is_an_error() {
        let err = parse_command("Read GIS == \"gis\\a.shp", "m.tgc", 9).unwrap_err();
        assert_eq!(err.line, 9);
        assert!(err.message.contains("unterminated quote"));
    }

    #[test]
    fn comment_and_blank_lines_have_empty_keyword() {
        let lines = lex("! heading\n\n# other", "m.tcf").unwrap();
        assert_eq!(lines.len(), 3);
        assert!(lines.iter().all(|l| l.command.is_comment_line()));
        assert!(lines.iter().all(|l| l.directive.is_none()));
    }

    #[test]
    fn pipe_continues_value_on_next_line() {
        let src = "Read GIS Z Shape == gis\\2d_zsh_L.shp |\n    gis\\2d_zsh_P.shp\nTimestep == 2";
        let lines = lex(src, "m.tgc").unwrap();
        assert_eq!(lines.len(), 2);
        assert_eq!(
            lines[0].command.rhs.as_deref(),
            Some("gis\\2d_zsh_L.shp | gis\\2d_zsh_P.shp")
        );
        assert_eq!(lines[1].command.prov.line, 3);
    }

    #[test]
    fn classifies_structural_keywords_case_insensitively() {
        let src = "IF SCENARIO == D01 | D02\nelse if event == Q100\nElse\nEnd If\n\
                   Define Event == Q100\nEnd Define\nStart 1D Domain\nEnd Domain\n\
                   If Variable CELL_SIZE == 5";
        let lines = lex(src, "m.tcf").unwrap();
        let d: Vec<_> = lines.iter().map(|l| l.directive.clone().unwrap()).collect();
        assert_eq!(d[0], Directive::If(Scope::scenario("D01 | D02")));
        assert_eq!(d[1], Directive::ElseIf(Scope::event("Q100")));
        assert_eq!(d[2], Directive::Else);
        assert_eq!(d[3], Directive::EndIf);
        assert_eq!(
            d[4],
            Directive::Define(Scope::from_expr(ScopeKind::EventVariable, "Q100"))
        );
        assert_eq!(d[5], Directive::EndDefine);
        assert_eq!(d[6], Directive::StartDomain);
        assert_eq!(d[7], Directive::EndDomain);
        assert_eq!(d[8], Directive::If(Scope::variable("CELL_SIZE", "5")));
    }

    #[test]
    fn if_without_condition_is_structural_error() {
        let err = lex("If Scenario ==", "m.tcf").unwrap_err();
        assert_eq!(err.kind, crate::error::ParseErrorKind::Structure);
    }
}
