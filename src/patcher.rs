use tracing::trace;

use crate::error::{PatchError, Result};
use crate::model::{AppliedInjection, Position};

fn newline_count(code: &str) -> u32 {
    code.matches('\n').count() as u32
}

/// Length in UTF-16 code units, the unit of source map columns.
fn utf16_len(code: &str) -> u32 {
    code.encode_utf16().count() as u32
}

/// Shift a raw generated position past every earlier splice.
///
/// `prior` holds raw positions in application order. Splices on earlier
/// lines push the line down by their newline count. Splices earlier on the
/// same line push the line down when multi-line, otherwise shift the column
/// by their length. Everything else has no effect.
pub fn adjust(raw: Position, prior: &[AppliedInjection]) -> Position {
    let mut line_offset = 0u32;
    let mut column_offset = 0u32;
    for p in prior {
        let newlines = newline_count(&p.code);
        if p.position.line < raw.line {
            line_offset += newlines;
        } else if p.position.line == raw.line && p.position.column <= raw.column {
            if newlines > 0 {
                line_offset += newlines;
            } else {
                column_offset += utf16_len(&p.code);
            }
        }
    }
    Position::new(raw.line + line_offset, raw.column + column_offset)
}

/// Byte index of UTF-16 column `column`, clamped to the end of `line`.
/// A column inside a surrogate pair rounds up to the next character.
fn byte_index(line: &str, column: u32) -> usize {
    let mut units = 0u32;
    for (idx, c) in line.char_indices() {
        if units >= column {
            return idx;
        }
        units += c.len_utf16() as u32;
    }
    line.len()
}

/// Splice `fragment` into `bundle` at `raw`, adjusted for `prior`.
///
/// Only the target line changes. A column past the end of the line appends.
pub fn inject(
    bundle: &str,
    raw: Position,
    prior: &[AppliedInjection],
    fragment: &str,
) -> Result<String> {
    let adjusted = adjust(raw, prior);
    let mut lines: Vec<&str> = bundle.split('\n').collect();
    let count = lines.len();
    if adjusted.line == 0 || adjusted.line as usize > count {
        return Err(PatchError::OutOfBounds {
            position: adjusted,
            lines: count,
        });
    }
    trace!(%raw, %adjusted, prior = prior.len(), "splicing fragment");

    let idx = adjusted.line as usize - 1;
    let line = lines[idx];
    let at = byte_index(line, adjusted.column);
    let patched = format!("{}{}{}", &line[..at], fragment, &line[at..]);
    lines[idx] = &patched;
    Ok(lines.join("\n"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn applied(line: u32, column: u32, code: &str) -> AppliedInjection {
        AppliedInjection::new(Position::new(line, column), code)
    }

    #[test]
    fn empty_history_is_identity() {
        for pos in [Position::new(1, 0), Position::new(5, 3), Position::new(400, 81)] {
            assert_eq!(adjust(pos, &[]), pos);
        }
    }

    #[test]
    fn single_line_fragment_shifts_same_line_only() {
        let prior = [applied(5, 3, "track();")];
        assert_eq!(adjust(Position::new(5, 10), &prior), Position::new(5, 18));
        assert_eq!(adjust(Position::new(6, 0), &prior), Position::new(6, 0));
        assert_eq!(adjust(Position::new(5, 2), &prior), Position::new(5, 2));
        assert_eq!(adjust(Position::new(4, 9), &prior), Position::new(4, 9));
    }

    #[test]
    fn multi_line_fragment_pushes_lines_down() {
        let prior = [applied(5, 3, "a();\nb();\nc();")];
        assert_eq!(adjust(Position::new(6, 0), &prior), Position::new(8, 0));
        // Same line, later column: line moves, column is left as is.
        assert_eq!(adjust(Position::new(5, 7), &prior), Position::new(7, 7));
    }

    #[test]
    fn same_position_lands_after_earlier_splice() {
        let prior = [applied(2, 2, "first();")];
        assert_eq!(adjust(Position::new(2, 2), &prior), Position::new(2, 10));
    }

    #[test]
    fn offsets_accumulate_over_history() {
        let prior = [
            applied(1, 0, "x();\n"),
            applied(3, 4, "y();"),
            applied(3, 1, "zz();"),
            applied(9, 0, "late();\n"),
        ];
        assert_eq!(adjust(Position::new(3, 6), &prior), Position::new(4, 15));
    }

    #[test]
    fn inject_splices_only_target_line() {
        let bundle = "function run(){\n  console.log(1);\n}\n";
        let out = inject(bundle, Position::new(2, 2), &[], "console.log(0);").unwrap();
        assert_eq!(out, "function run(){\n  console.log(0);console.log(1);\n}\n");
    }

    #[test]
    fn inject_applies_history() {
        let bundle = "a(){x()}\nb(){y()}";
        let first = "p();";
        let step1 = inject(bundle, Position::new(1, 4), &[], first).unwrap();
        let history = [applied(1, 4, first)];
        let step2 = inject(&step1, Position::new(1, 8), &history, "q();").unwrap();
        assert_eq!(step2, "a(){p();x()}q();\nb(){y()}");
    }

    #[test]
    fn inject_handles_multibyte_lines() {
        let out = inject("s='é';go()", Position::new(1, 6), &[], "hit();").unwrap();
        assert_eq!(out, "s='é';hit();go()");
    }

    #[test]
    fn columns_count_utf16_units() {
        // The emoji is two UTF-16 units, so `go` starts at column 7.
        let out = inject("s=\"😀\";go()", Position::new(1, 7), &[], "hit();").unwrap();
        assert_eq!(out, "s=\"😀\";hit();go()");

        let prior = [applied(1, 0, "t('😀');")];
        assert_eq!(adjust(Position::new(1, 3), &prior), Position::new(1, 11));
    }

    #[test]
    fn line_outside_bundle_is_out_of_bounds() {
        let err = inject("a\nb", Position::new(3, 0), &[], "x").unwrap_err();
        assert!(matches!(err, PatchError::OutOfBounds { lines: 2, .. }));
        let prior = [applied(1, 0, "\n\n")];
        assert!(inject("a\nb", Position::new(2, 0), &prior, "x").is_err());
    }
}
