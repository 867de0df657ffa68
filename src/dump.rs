// ============================================================================
// API Dump - 规范化文本输出与参考文件比对
// ============================================================================
//
// Reference file format (one block per class, blank line after each block):
//
//   public final class com/example/Foo : com/example/Base {
//   	public fun <init> ()V
//   	public final fun bar (I)V
//   	public static final field X I
//   }
//
// Comparison normalizes CRLF and ignores trailing blank lines, then aligns
// the two texts with an LCS so one missing line is reported once.

use std::fmt;
use std::fs;
use std::io::ErrorKind;
use std::path::Path;

use serde::Serialize;

use crate::api::{ApiSnapshot, ClassApiEntry, MemberApiEntry};
use crate::error::{ApiCheckError, Result};

/// LCS table cap; beyond it the middle section is compared positionally
const MAX_LCS_CELLS: usize = 16 * 1024 * 1024;

// ============================================================================
// Rendering
// ============================================================================

pub fn render(snapshot: &ApiSnapshot) -> String {
    let mut out = String::new();
    for class in &snapshot.classes {
        out.push_str(&class_header(class));
        out.push('\n');
        for member in &class.members {
            out.push('\t');
            out.push_str(&member_line(member));
            out.push('\n');
        }
        out.push_str("}\n\n");
    }
    out
}

fn class_header(class: &ClassApiEntry) -> String {
    let mut line = format!(
        "{} {} {}",
        class.modifiers().join(" "),
        class.kind.keyword(),
        class.name
    );
    let supertypes = class.supertypes();
    if !supertypes.is_empty() {
        line.push_str(" : ");
        line.push_str(&supertypes.join(", "));
    }
    line.push_str(" {");
    line
}

fn member_line(member: &MemberApiEntry) -> String {
    format!(
        "{} {} {} {}",
        member.modifiers().join(" "),
        member.kind,
        member.name,
        member.descriptor
    )
}

// ============================================================================
// Diff
// ============================================================================

/// One differing line. `expected_*` refers to the reference file, `actual_*`
/// to the freshly rendered dump; line numbers are 1-based.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LineDiff {
    pub expected_line: Option<usize>,
    pub actual_line: Option<usize>,
    pub expected: Option<String>,
    pub actual: Option<String>,
}

impl LineDiff {
    /// Line present in the reference but absent from the actual dump
    pub fn is_missing_in_actual(&self) -> bool {
        self.expected.is_some() && self.actual.is_none()
    }

    /// Line present in the actual dump but absent from the reference
    pub fn is_unexpected_in_actual(&self) -> bool {
        self.expected.is_none() && self.actual.is_some()
    }
}

impl fmt::Display for LineDiff {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let n = |l: Option<usize>| l.map(|v| v.to_string()).unwrap_or_else(|| "-".into());
        match (&self.expected, &self.actual) {
            (Some(e), Some(a)) => write!(
                f,
                "  line {} (actual {}): expected `{}`, actual `{}`",
                n(self.expected_line),
                n(self.actual_line),
                e,
                a
            ),
            (Some(e), None) => write!(
                f,
                "- line {} missing in actual: `{}`",
                n(self.expected_line),
                e
            ),
            (None, Some(a)) => write!(
                f,
                "+ line {} not in reference: `{}`",
                n(self.actual_line),
                a
            ),
            (None, None) => Ok(()),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", content = "diffs", rename_all = "lowercase")]
pub enum Comparison {
    Match,
    Mismatch(Vec<LineDiff>),
}

impl Comparison {
    pub fn is_match(&self) -> bool {
        matches!(self, Comparison::Match)
    }

    pub fn diffs(&self) -> &[LineDiff] {
        match self {
            Comparison::Match => &[],
            Comparison::Mismatch(d) => d,
        }
    }
}

fn normalized_lines(text: &str) -> Vec<&str> {
    let mut lines: Vec<&str> = text
        .split('\n')
        .map(|l| l.strip_suffix('\r').unwrap_or(l))
        .collect();
    while lines.last().is_some_and(|l| l.trim().is_empty()) {
        lines.pop();
    }
    lines
}

pub fn compare_text(expected: &str, actual: &str) -> Comparison {
    let diffs = diff_lines(expected, actual);
    if diffs.is_empty() {
        Comparison::Match
    } else {
        Comparison::Mismatch(diffs)
    }
}

enum Op {
    Keep,
    Delete(usize),
    Insert(usize),
}

/// Every differing line between `expected` and `actual`
pub fn diff_lines(expected: &str, actual: &str) -> Vec<LineDiff> {
    let exp = normalized_lines(expected);
    let act = normalized_lines(actual);

    let prefix = exp.iter().zip(&act).take_while(|(a, b)| a == b).count();
    let suffix = exp[prefix..]
        .iter()
        .rev()
        .zip(act[prefix..].iter().rev())
        .take_while(|(a, b)| a == b)
        .count();

    let exp_mid = &exp[prefix..exp.len() - suffix];
    let act_mid = &act[prefix..act.len() - suffix];

    let ops = if exp_mid.len().saturating_mul(act_mid.len()) <= MAX_LCS_CELLS {
        lcs_ops(exp_mid, act_mid)
    } else {
        positional_ops(exp_mid.len(), act_mid.len())
    };

    let mut diffs = Vec::new();
    let mut deleted: Vec<usize> = Vec::new();
    let mut inserted: Vec<usize> = Vec::new();

    let mut flush = |deleted: &mut Vec<usize>, inserted: &mut Vec<usize>| {
        let paired = deleted.len().min(inserted.len());
        for k in 0..paired {
            let (e, a) = (deleted[k], inserted[k]);
            diffs.push(LineDiff {
                expected_line: Some(prefix + e + 1),
                actual_line: Some(prefix + a + 1),
                expected: Some(exp_mid[e].to_string()),
                actual: Some(act_mid[a].to_string()),
            });
        }
        for &e in &deleted[paired..] {
            diffs.push(LineDiff {
                expected_line: Some(prefix + e + 1),
                actual_line: None,
                expected: Some(exp_mid[e].to_string()),
                actual: None,
            });
        }
        for &a in &inserted[paired..] {
            diffs.push(LineDiff {
                expected_line: None,
                actual_line: Some(prefix + a + 1),
                expected: None,
                actual: Some(act_mid[a].to_string()),
            });
        }
        deleted.clear();
        inserted.clear();
    };

    for op in ops {
        match op {
            Op::Keep => flush(&mut deleted, &mut inserted),
            Op::Delete(i) => deleted.push(i),
            Op::Insert(j) => inserted.push(j),
        }
    }
    flush(&mut deleted, &mut inserted);

    diffs
}

fn lcs_ops(exp: &[&str], act: &[&str]) -> Vec<Op> {
    let (n, m) = (exp.len(), act.len());
    let width = m + 1;
    // table[i][j] = LCS length of exp[i..] and act[j..]
    let mut table = vec![0u32; (n + 1) * width];
    for i in (0..n).rev() {
        for j in (0..m).rev() {
            table[i * width + j] = if exp[i] == act[j] {
                table[(i + 1) * width + j + 1] + 1
            } else {
                table[(i + 1) * width + j].max(table[i * width + j + 1])
            };
        }
    }

    let mut ops = Vec::with_capacity(n + m);
    let (mut i, mut j) = (0, 0);
    while i < n && j < m {
        if exp[i] == act[j] {
            ops.push(Op::Keep);
            i += 1;
            j += 1;
        } else if table[(i + 1) * width + j] >= table[i * width + j + 1] {
            ops.push(Op::Delete(i));
            i += 1;
        } else {
            ops.push(Op::Insert(j));
            j += 1;
        }
    }
    ops.extend((i..n).map(Op::Delete));
    ops.extend((j..m).map(Op::Insert));
    ops
}

fn positional_ops(n: usize, m: usize) -> Vec<Op> {
    let mut ops: Vec<Op> = (0..n).map(Op::Delete).collect();
    ops.extend((0..m).map(Op::Insert));
    ops
}

/// Compare a rendered dump with the on-disk reference.
/// The reference is never created or rewritten here.
pub fn compare_with_reference(actual: &str, reference: &Path) -> Result<Comparison> {
    let expected = match fs::read_to_string(reference) {
        Ok(text) => text,
        Err(e) if e.kind() == ErrorKind::NotFound => {
            return Err(ApiCheckError::MissingReferenceFile {
                path: reference.to_path_buf(),
            })
        }
        Err(e) => return Err(ApiCheckError::io(reference, e)),
    };
    Ok(compare_text(&expected, actual))
}
