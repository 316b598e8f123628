//! Alias, project label and language mapping commands.

use std::io::Write;

use anyhow::Result;

use ct_core::EntityType;
use ct_engine::Engine;

use super::util::load_user;
use crate::cli::{AliasAction, LabelAction, MappingAction};

pub fn alias<W: Write>(writer: &mut W, engine: &Engine, action: &AliasAction) -> Result<()> {
    let rules = engine.rules();
    match action {
        AliasAction::Add {
            user,
            entity_type,
            key,
            value,
        } => {
            let user = load_user(engine, user)?;
            let entity_type: EntityType = entity_type.parse()?;
            let id = rules.add_alias(&user.id, entity_type, key, value)?;
            writeln!(writer, "Added alias {id}: {entity_type} {value} -> {key}")?;
        }
        AliasAction::List { user } => {
            let user = load_user(engine, user)?;
            let aliases = rules.aliases(&user.id)?;
            if aliases.is_empty() {
                writeln!(writer, "No aliases.")?;
            }
            for alias in aliases {
                writeln!(
                    writer,
                    "{:>5}  {:<16} {} -> {}",
                    alias.id,
                    alias.entity_type.as_str(),
                    alias.value,
                    alias.key
                )?;
            }
        }
        AliasAction::Delete { user, id } => {
            let user = load_user(engine, user)?;
            rules.delete_alias(&user.id, *id)?;
            writeln!(writer, "Deleted alias {id}")?;
        }
    }
    Ok(())
}

pub fn label<W: Write>(writer: &mut W, engine: &Engine, action: &LabelAction) -> Result<()> {
    let rules = engine.rules();
    match action {
        LabelAction::Add { user, project, label } => {
            let user = load_user(engine, user)?;
            let id = rules.add_project_label(&user.id, project, label)?;
            writeln!(writer, "Added label {id}: {project} -> {label}")?;
        }
        LabelAction::List { user } => {
            let user = load_user(engine, user)?;
            let labels = rules.labels(&user.id)?;
            if labels.is_empty() {
                writeln!(writer, "No labels.")?;
            }
            for label in labels {
                writeln!(writer, "{:>5}  {} -> {}", label.id, label.project_key, label.label)?;
            }
        }
        LabelAction::Delete { user, id } => {
            let user = load_user(engine, user)?;
            rules.delete_project_label(&user.id, *id)?;
            writeln!(writer, "Deleted label {id}")?;
        }
    }
    Ok(())
}

pub fn mapping<W: Write>(writer: &mut W, engine: &Engine, action: &MappingAction) -> Result<()> {
    let rules = engine.rules();
    match action {
        MappingAction::Add {
            user,
            extension,
            language,
        } => {
            let user = load_user(engine, user)?;
            let id = rules.set_language_mapping(&user.id, extension, language)?;
            writeln!(writer, "Mapping {id}: {extension} -> {language}")?;
        }
        MappingAction::List { user } => {
            let user = load_user(engine, user)?;
            let mappings = rules.language_mappings(&user.id)?;
            if mappings.is_empty() {
                writeln!(writer, "No language mappings.")?;
            }
            for mapping in mappings {
                writeln!(
                    writer,
                    "{:>5}  .{} -> {}",
                    mapping.id, mapping.extension, mapping.language
                )?;
            }
        }
        MappingAction::Delete { user, id } => {
            let user = load_user(engine, user)?;
            rules.delete_language_mapping(&user.id, *id)?;
            writeln!(writer, "Deleted language mapping {id}")?;
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use chrono::Utc;
    use ct_core::{User, UserId};
    use ct_db::Database;
    use ct_engine::EngineConfig;
    use insta::assert_snapshot;

    use super::*;

    fn engine() -> Engine {
        let engine = Engine::new(Database::open_in_memory().unwrap(), EngineConfig::default());
        engine
            .create_user(&User::new(UserId::new("alice").unwrap(), Utc::now()))
            .unwrap();
        engine
    }

    fn text(output: Vec<u8>) -> String {
        String::from_utf8(output).unwrap()
    }

    #[test]
    fn aliases_can_be_added_listed_and_deleted() {
        let engine = engine();
        let user = "alice".to_string();
        let mut output = Vec::new();
        alias(
            &mut output,
            &engine,
            &AliasAction::Add {
                user: user.clone(),
                entity_type: "projects".to_string(),
                key: "ct".to_string(),
                value: "codetime".to_string(),
            },
        )
        .unwrap();
        assert!(text(output).contains("codetime -> ct"));

        let mut listing = Vec::new();
        alias(&mut listing, &engine, &AliasAction::List { user: user.clone() }).unwrap();
        let listing = text(listing);
        let id: i64 = listing.split_whitespace().next().unwrap().parse().unwrap();
        assert!(listing.contains("project"));

        let mut output = Vec::new();
        alias(&mut output, &engine, &AliasAction::Delete { user: user.clone(), id }).unwrap();
        assert!(alias(&mut output, &engine, &AliasAction::Delete { user, id }).is_err());
    }

    #[test]
    fn rules_are_listed_per_kind() {
        let engine = engine();
        let user = "alice".to_string();
        let mut output = Vec::new();
        alias(
            &mut output,
            &engine,
            &AliasAction::Add {
                user: user.clone(),
                entity_type: "projects".to_string(),
                key: "ct".to_string(),
                value: "codetime".to_string(),
            },
        )
        .unwrap();
        label(
            &mut output,
            &engine,
            &LabelAction::Add {
                user: user.clone(),
                project: "ct".to_string(),
                label: "oss".to_string(),
            },
        )
        .unwrap();
        mapping(
            &mut output,
            &engine,
            &MappingAction::Add {
                user: user.clone(),
                extension: ".tmpl".to_string(),
                language: "Go Template".to_string(),
            },
        )
        .unwrap();

        alias(&mut output, &engine, &AliasAction::List { user: user.clone() }).unwrap();
        label(&mut output, &engine, &LabelAction::List { user: user.clone() }).unwrap();
        mapping(&mut output, &engine, &MappingAction::List { user }).unwrap();
        assert_snapshot!(text(output));
    }

    #[test]
    fn aliases_require_a_known_dimension() {
        let engine = engine();
        let mut output = Vec::new();
        let action = AliasAction::Add {
            user: "alice".to_string(),
            entity_type: "color".to_string(),
            key: "red".to_string(),
            value: "crimson".to_string(),
        };
        assert!(alias(&mut output, &engine, &action).is_err());
    }
}
