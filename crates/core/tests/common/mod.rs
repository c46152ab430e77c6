//! Shared test helpers for `textarc_core` integration tests.

#![allow(unreachable_pub, dead_code)]

use std::rc::Rc;

use textarc_command_db::{
    Command, CommandDatabase, CommandDefinition, CommandElementDefinition, DataGroup,
    DirectiveKind, EndType, ParameterDefinition, Script, ScriptElement, SnippetCommand,
};
use textarc_core::TableEncoding;

/// A small database covering every codec feature the tests exercise:
/// a script terminator, a bit-packed printing command, a data-entry
/// table, a jump, assorted non-printing commands, and the `clear`
/// command used as the text-box split snippet.
pub fn database() -> CommandDatabase {
    let mut db = CommandDatabase::new("testdb");

    let mut end = CommandDefinition::new("end", vec![0xE0], vec![0xFF]);
    end.end_type = EndType::Always;
    db.add(end).unwrap();

    let mut glyph = CommandDefinition::new("glyph", vec![0x10], vec![0xF0]);
    glyph.prints = true;
    glyph.elements = vec![CommandElementDefinition::scalar(
        "args",
        vec![ParameterDefinition::new("value", 0, 0, 4)],
    )];
    db.add(glyph).unwrap();

    let mut table = CommandDefinition::new("table", vec![0x80], vec![0xFF]);
    let end_kind = |name: &str| {
        let mut par = ParameterDefinition::new(name, 0, 0, 8);
        par.offset_kind = textarc_command_db::OffsetKind::End;
        par
    };
    table.elements = vec![CommandElementDefinition::repeated(
        "rows",
        ParameterDefinition::new("count", 1, 0, 8),
        vec![DataGroup::new(vec![
            end_kind("a"),
            end_kind("b"),
            end_kind("c"),
        ])],
    )];
    db.add(table).unwrap();

    let mut jump = CommandDefinition::new("jump", vec![0xF0], vec![0xFF]);
    jump.end_type = EndType::Default;
    let mut target = ParameterDefinition::new("target", 1, 0, 8);
    target.is_jump = true;
    jump.elements = vec![CommandElementDefinition::scalar("args", vec![target])];
    db.add(jump).unwrap();

    let mut color = CommandDefinition::new("color", vec![0xB0], vec![0xFF]);
    color.prints = true;
    db.add(color).unwrap();

    for (name, byte) in [("delay", 0xC1u8), ("sound", 0xC2), ("portrait", 0xC3)] {
        db.add(CommandDefinition::new(name, vec![byte], vec![0xFF]))
            .unwrap();
    }

    db.add(CommandDefinition::new("clear", vec![0xD0], vec![0xFF]))
        .unwrap();
    db.set_split_snippet(vec![SnippetCommand {
        name: "clear".to_string(),
        values: Default::default(),
    }])
    .unwrap();

    db
}

/// Lower-case ASCII letters at `0x61..=0x7A` plus a space at `0x20`.
pub fn encoding() -> TableEncoding {
    let mut enc = TableEncoding::new("ascii-ish");
    for (i, c) in ('a'..='z').enumerate() {
        enc.add(&[0x61 + i as u8], &c.to_string()).unwrap();
    }
    enc.add(&[0x20], " ").unwrap();
    enc
}

/// Instantiate a command by name (first overload).
pub fn command(db: &CommandDatabase, name: &str) -> ScriptElement {
    let def = Rc::clone(&db.find(name)[0]);
    ScriptElement::Command(Command::new(def))
}

/// A text element.
pub fn text(value: &str) -> ScriptElement {
    ScriptElement::text(value)
}

/// A directive element with an empty payload.
pub fn directive(kind: DirectiveKind) -> ScriptElement {
    ScriptElement::Directive(textarc_command_db::Directive::new(kind))
}

/// Build a script from elements.
pub fn script(db: &CommandDatabase, elements: Vec<ScriptElement>) -> Script {
    let mut script = Script::new(db.name());
    script.elements = elements;
    script
}

/// Compact rendering of a script's element structure for assertions:
/// commands by name, text quoted, bytes in hex, directives by kind.
pub fn shape(script: &Script) -> Vec<String> {
    script
        .elements
        .iter()
        .map(|element| match element {
            ScriptElement::Command(cmd) => cmd.name().to_string(),
            ScriptElement::Text { text } => format!("{text:?}"),
            ScriptElement::Byte { value } => format!("${value:02X}"),
            ScriptElement::Directive(d) => format!("@{:?}", d.kind),
        })
        .collect()
}
