//! The text-box patcher.
//!
//! Splices authored text boxes onto the command skeleton of an existing
//! archive. Non-printed skeleton elements pass through untouched; printed
//! runs are rebuilt from the patch, with authored command placeholders
//! rebound to the base's command instances by name.
//!
//! A text-box split directive in the patch either lines up with an
//! existing split boundary in the base (the snippet commands already sit
//! between the two runs) or, when the base has no such boundary, injects
//! the database's split snippet to create one. An empty patch box merges
//! the surrounding base boxes by consuming the snippet commands from the
//! base skeleton.

use std::collections::VecDeque;

use textarc_command_db::{Command, CommandDatabase, Script, ScriptElement, TextArchive};

use crate::error::{Error, Result};

/// Apply `patch` to `base`, script by script.
///
/// Scripts pair by index; patch scripts without printed content leave
/// their base script untouched. Failures are argument errors naming the
/// base archive's identifier.
pub fn patch_archive(
    database: &CommandDatabase,
    base: &mut TextArchive,
    patch: &TextArchive,
) -> Result<()> {
    if patch.scripts.len() > base.scripts.len() {
        return Err(Error::patch(
            &base.identifier,
            format!(
                "patch has {} scripts but the base has {}",
                patch.scripts.len(),
                base.scripts.len()
            ),
        ));
    }
    for (index, patch_script) in patch.scripts.iter().enumerate() {
        if !patch_script.has_printed_elements() {
            continue;
        }
        base.scripts[index] =
            patch_script_boxes(database, &base.scripts[index], patch_script, &base.identifier)?;
    }
    Ok(())
}

/// One extracted patch segment: the authored content of a rendered box.
enum Segment {
    /// No content before the next boundary: the author deleted a box.
    Empty,
    /// Authored content; `split` is set when the segment was closed by a
    /// text-box split directive rather than a separator.
    Content {
        elements: Vec<ScriptElement>,
        split: bool,
    },
}

/// Patch one script's text boxes.
pub fn patch_script_boxes(
    database: &CommandDatabase,
    base: &Script,
    patch: &Script,
    identifier: &str,
) -> Result<Script> {
    let mut out = Script::new(base.database_name.clone());
    let b = &base.elements;
    let mut bi = 0usize;
    let mut pi = 0usize;

    while bi < b.len() {
        if !b[bi].is_printed() {
            out.elements.push(b[bi].clone());
            bi += 1;
            continue;
        }
        // A logical text box: it may span several base runs (merges) and
        // several patch segments (inserted splits).
        let mut pool: VecDeque<Command> = VecDeque::new();
        let mut replacement: Vec<ScriptElement> = Vec::new();
        'boxes: loop {
            // Absorb the current printed run. Base text and raw bytes are
            // dropped (the authored text replaces them); printed commands
            // go into the pool for placeholder rebinding.
            while bi < b.len() && !b[bi].ends_text_box() {
                if let ScriptElement::Command(cmd) = &b[bi] {
                    pool.push_back(cmd.clone());
                }
                bi += 1;
            }
            loop {
                match next_patch_segment(&patch.elements, &mut pi, identifier)? {
                    Segment::Empty => {
                        consume_snippet_boundary(
                            database,
                            b,
                            &mut bi,
                            &mut replacement,
                            identifier,
                        )?;
                        continue 'boxes;
                    }
                    Segment::Content { elements, split } => {
                        rebind_segment(&elements, &mut pool, &mut replacement, identifier)?;
                        if !split {
                            break 'boxes;
                        }
                        if boundary_is_split(database, b, bi) {
                            // The base already renders a split here; the
                            // skeleton passes through after the box.
                            break 'boxes;
                        }
                        // The author added a split the base does not
                        // have: inject the snippet and keep going within
                        // the same base box.
                        let snippet = database.split_snippet().ok_or_else(|| {
                            Error::patch(
                                identifier,
                                "split requested but the database has no split snippet",
                            )
                        })?;
                        replacement.extend(snippet.elements.iter().cloned());
                    }
                }
            }
        }
        if let Some(leftover) = pool.front() {
            return Err(Error::patch(
                identifier,
                format!("text box command {} left unmatched", leftover.name()),
            ));
        }
        out.elements.append(&mut replacement);
    }

    if patch.elements[pi..].iter().any(ScriptElement::is_printed) {
        return Err(Error::patch(
            identifier,
            "patch script has more text boxes than the base",
        ));
    }
    Ok(out)
}

/// Extract the next patch segment.
///
/// Collects elements up to the next box boundary. A split directive
/// closes the segment with `split` set; a separator directive closes it
/// and is consumed; other box-ending elements (script and archive
/// directives, stray non-printing commands) are skipped. Requesting a
/// segment past the end of the patch is "patch script too short".
fn next_patch_segment(
    p: &[ScriptElement],
    pi: &mut usize,
    identifier: &str,
) -> Result<Segment> {
    if *pi >= p.len() {
        return Err(Error::patch(identifier, "patch script has too few text boxes"));
    }
    let mut elements = Vec::new();
    loop {
        if *pi >= p.len() {
            break;
        }
        let element = &p[*pi];
        if element.splits_text_box() {
            *pi += 1;
            return Ok(Segment::Content {
                elements,
                split: true,
            });
        }
        if element.ends_text_box() {
            let is_separator = matches!(
                element,
                ScriptElement::Directive(d)
                    if d.kind == textarc_command_db::DirectiveKind::TextBoxSeparator
            );
            *pi += 1;
            if is_separator {
                break;
            }
            continue;
        }
        elements.push(element.clone());
        *pi += 1;
    }
    if elements.is_empty() {
        Ok(Segment::Empty)
    } else {
        Ok(Segment::Content {
            elements,
            split: false,
        })
    }
}

/// Rebuild one segment, rebinding authored command placeholders to the
/// first surviving base command with the same name.
fn rebind_segment(
    elements: &[ScriptElement],
    pool: &mut VecDeque<Command>,
    replacement: &mut Vec<ScriptElement>,
    identifier: &str,
) -> Result<()> {
    for element in elements {
        match element {
            ScriptElement::Command(placeholder) => {
                let position = pool
                    .iter()
                    .position(|c| c.name().eq_ignore_ascii_case(placeholder.name()))
                    .ok_or_else(|| {
                        Error::patch(
                            identifier,
                            format!(
                                "no command {} in the base text box",
                                placeholder.name()
                            ),
                        )
                    })?;
                if let Some(command) = pool.remove(position) {
                    replacement.push(ScriptElement::Command(command));
                }
            }
            ScriptElement::Text { .. } | ScriptElement::Byte { .. } => {
                replacement.push(element.clone());
            }
            ScriptElement::Directive(_) => {}
        }
    }
    Ok(())
}

/// Whether the base skeleton at `bi` (up to the next printed run)
/// contains the split snippet's command sequence.
pub(crate) fn boundary_is_split(database: &CommandDatabase, b: &[ScriptElement], bi: usize) -> bool {
    let Some(snippet) = database.split_snippet() else {
        return false;
    };
    let names = snippet_names(snippet);
    if names.is_empty() {
        return false;
    }
    let mut matched = 0usize;
    for element in b[bi..].iter().take_while(|e| !e.is_printed()) {
        if let ScriptElement::Command(cmd) = element {
            if cmd.name().eq_ignore_ascii_case(&names[matched]) {
                matched += 1;
                if matched == names.len() {
                    return true;
                }
            } else {
                matched = 0;
            }
        }
    }
    false
}

/// Remove the split snippet's commands from the base skeleton at `bi`,
/// keeping any other skeleton elements, so the surrounding boxes merge.
fn consume_snippet_boundary(
    database: &CommandDatabase,
    b: &[ScriptElement],
    bi: &mut usize,
    replacement: &mut Vec<ScriptElement>,
    identifier: &str,
) -> Result<()> {
    let snippet = database.split_snippet().ok_or_else(|| {
        Error::patch(identifier, "merge requires a split snippet in the database")
    })?;
    let names = snippet_names(snippet);
    let mut consumed = 0usize;
    while *bi < b.len() && !b[*bi].is_printed() {
        match &b[*bi] {
            ScriptElement::Command(cmd)
                if consumed < names.len()
                    && cmd.name().eq_ignore_ascii_case(&names[consumed]) =>
            {
                consumed += 1;
            }
            other => replacement.push(other.clone()),
        }
        *bi += 1;
    }
    if consumed < names.len() {
        return Err(Error::patch(
            identifier,
            "no split boundary to merge at this position",
        ));
    }
    Ok(())
}

fn snippet_names(snippet: &Script) -> Vec<String> {
    snippet
        .elements
        .iter()
        .filter_map(|element| match element {
            ScriptElement::Command(cmd) => Some(cmd.name().to_string()),
            _ => None,
        })
        .collect()
}
