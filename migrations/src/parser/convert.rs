//! Translation of a parsed schema document into the schema model

use super::ast::{
    Attribute, Declaration, Expr, Field, Member, ModelBlock, SchemaDocument, TypeKind,
    TypeModifier,
};
use crate::sqlite::ddl::normalize_raw_default;
use std::collections::BTreeSet;
use veloria_types::{
    Column, DefaultValue, ForeignKey, IdGenerator, Index, ReferentialAction, Schema, Table,
};

/// Logical type enum-typed fields are stored as
const ENUM_STORAGE_TYPE: &str = "String";

/// Errors translating a document into the schema model
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ConvertError {
    #[error("line {line}: model '{model}' is declared twice")]
    DuplicateModel { model: String, line: usize },

    #[error("line {line}: {model}.{field} is a list of scalars, which SQLite cannot store")]
    ScalarList {
        model: String,
        field: String,
        line: usize,
    },

    #[error("line {line}: unsupported default on {model}.{field}: {reason}")]
    UnsupportedDefault {
        model: String,
        field: String,
        line: usize,
        reason: String,
    },

    #[error("line {line}: @{attribute} on {model} names unknown field '{field}'")]
    UnknownField {
        model: String,
        attribute: String,
        field: String,
        line: usize,
    },

    #[error("line {line}: invalid @{attribute} on {model}: {reason}")]
    InvalidAttribute {
        model: String,
        attribute: String,
        line: usize,
        reason: String,
    },
}

/// Names every field and block translation needs to look up
struct Names<'a> {
    models: BTreeSet<&'a str>,
    enums: BTreeSet<&'a str>,
}

/// Translate a document into the schema model
pub fn to_schema(doc: &SchemaDocument) -> Result<Schema, ConvertError> {
    let names = Names {
        models: doc.models().map(|m| m.name.as_str()).collect(),
        enums: doc.enums().map(|e| e.name.as_str()).collect(),
    };

    let mut schema = Schema::new();
    let mut seen = BTreeSet::new();
    for decl in &doc.declarations {
        match decl {
            Declaration::Model(model) => {
                if !seen.insert(model.name.as_str()) {
                    return Err(ConvertError::DuplicateModel {
                        model: model.name.clone(),
                        line: model.line,
                    });
                }
                schema.insert(convert_model(model, &names)?);
            }
            Declaration::Enum(_) | Declaration::Datasource(_) | Declaration::Generator(_) => {}
        }
    }
    Ok(schema)
}

fn convert_model(model: &ModelBlock, names: &Names<'_>) -> Result<Table, ConvertError> {
    let mut table = Table::new(&model.name);
    let mut block_attributes = Vec::new();
    let mut foreign_keys = Vec::new();

    for member in &model.members {
        match member {
            Member::BlockAttribute(attr) => block_attributes.push(attr),
            Member::Field(field) => {
                if field.attribute("ignore").is_some() {
                    tracing::debug!(model = %model.name, field = %field.name, "skipping ignored field");
                    continue;
                }
                match &field.ty.kind {
                    TypeKind::Named(ty) if names.models.contains(ty.as_str()) => {
                        if let Some(fk) = relation(model, field, ty)? {
                            foreign_keys.push(fk);
                        }
                    }
                    TypeKind::Named(ty) => table.push_column(convert_column(model, field, ty, names)?),
                    TypeKind::Unsupported(ty) => table.push_column(convert_column(model, field, ty, names)?),
                }
            }
        }
    }

    for fk in foreign_keys {
        check_fields(model, &table, "relation", &fk.columns)?;
        table.foreign_keys.push(fk);
    }

    for attr in block_attributes {
        apply_block_attribute(model, &mut table, attr)?;
    }
    Ok(table)
}

// =============================================================================
// Fields
// =============================================================================

fn convert_column(
    model: &ModelBlock,
    field: &Field,
    ty: &str,
    names: &Names<'_>,
) -> Result<Column, ConvertError> {
    if field.ty.modifier == TypeModifier::List {
        return Err(ConvertError::ScalarList {
            model: model.name.clone(),
            field: field.name.clone(),
            line: field.line,
        });
    }

    let logical_type = if names.enums.contains(ty) { ENUM_STORAGE_TYPE } else { ty };
    let mut column = Column::new(&field.name, logical_type);
    column.nullable = field.ty.modifier == TypeModifier::Optional;

    for attr in &field.attributes {
        match attr.path.as_str() {
            "id" => column.primary_key = true,
            "unique" => column.unique = true,
            "map" => column.mapped_name = Some(string_arg(model, field.line, attr, "name")?),
            "default" => column.default = convert_default(model, field, attr)?,
            other => {
                tracing::debug!(model = %model.name, field = %field.name, attribute = other, "attribute has no effect on storage");
            }
        }
    }
    Ok(column)
}

fn convert_default(
    model: &ModelBlock,
    field: &Field,
    attr: &Attribute,
) -> Result<Option<DefaultValue>, ConvertError> {
    let unsupported = |reason: String| ConvertError::UnsupportedDefault {
        model: model.name.clone(),
        field: field.name.clone(),
        line: field.line,
        reason,
    };

    let Some(expr) = attr.positional(0).or_else(|| attr.named("value")) else {
        return Err(unsupported("missing value".to_string()));
    };

    let value = match expr {
        Expr::String(s) => DefaultValue::text(s.as_str()),
        Expr::Boolean(b) => DefaultValue::boolean(*b),
        Expr::Number(n) => match n.parse::<i64>() {
            Ok(i) => DefaultValue::integer(i),
            Err(_) => DefaultValue::real(
                n.parse::<f64>()
                    .map_err(|_| unsupported(format!("invalid number '{n}'")))?,
            ),
        },
        // enum value
        Expr::Ident(value) => DefaultValue::text(value.as_str()),
        Expr::Call { name, args } => match name.as_str() {
            "autoincrement" => DefaultValue::Autoincrement,
            "now" => DefaultValue::Now,
            "cuid" => DefaultValue::ClientId {
                generator: IdGenerator::Cuid,
            },
            "uuid" => DefaultValue::ClientId {
                generator: IdGenerator::Uuid,
            },
            "dbgenerated" => match args.first().and_then(|a| a.value.as_str()) {
                Some(sql) => DefaultValue::raw(normalize_raw_default(sql)),
                None => return Ok(None),
            },
            other => return Err(unsupported(format!("function {other}()"))),
        },
        Expr::Array(_) => return Err(unsupported("list value".to_string())),
    };
    Ok(Some(value))
}

/// A relation field becomes a foreign key on the side that holds `fields:`
fn relation(model: &ModelBlock, field: &Field, target: &str) -> Result<Option<ForeignKey>, ConvertError> {
    let Some(attr) = field.attribute("relation") else {
        return Ok(None);
    };
    let Some(fields) = attr.named("fields") else {
        return Ok(None);
    };

    let invalid = |reason: &str| ConvertError::InvalidAttribute {
        model: model.name.clone(),
        attribute: "relation".to_string(),
        line: field.line,
        reason: reason.to_string(),
    };

    let columns = field_list(fields).ok_or_else(|| invalid("`fields` must be a list of field names"))?;
    let references = attr
        .named("references")
        .and_then(field_list)
        .ok_or_else(|| invalid("`references` must be a list of field names"))?;
    if columns.is_empty() || columns.len() != references.len() {
        return Err(invalid("`fields` and `references` must have the same non-zero length"));
    }

    let mut fk = ForeignKey::new(columns, target, references);
    fk.on_update = referential_action(attr.named("onUpdate")).map_err(|r| invalid(&r))?;
    fk.on_delete = referential_action(attr.named("onDelete")).map_err(|r| invalid(&r))?;
    Ok(Some(fk))
}

fn referential_action(expr: Option<&Expr>) -> Result<Option<ReferentialAction>, String> {
    match expr {
        None => Ok(None),
        Some(Expr::Ident(name)) => ReferentialAction::from_name(name)
            .map(Some)
            .ok_or_else(|| format!("unknown referential action '{name}'")),
        Some(_) => Err("referential action must be an identifier".to_string()),
    }
}

// =============================================================================
// Block attributes
// =============================================================================

fn apply_block_attribute(model: &ModelBlock, table: &mut Table, attr: &Attribute) -> Result<(), ConvertError> {
    match attr.path.as_str() {
        "map" => table.mapped_name = Some(string_arg(model, model.line, attr, "name")?),
        "ignore" => table.ignored = true,
        "id" => {
            let fields = block_fields(model, attr)?;
            check_fields(model, table, "@id", &fields)?;
            table.set_primary_key(fields);
        }
        "index" | "unique" => {
            let fields = block_fields(model, attr)?;
            check_fields(model, table, &format!("@{}", attr.path), &fields)?;
            let mut index = Index::new(fields);
            if attr.path == "unique" {
                index = index.unique();
            }
            let name = attr
                .named("map")
                .or_else(|| attr.named("name"))
                .and_then(Expr::as_str);
            if let Some(name) = name {
                index = index.named(name);
            }
            table.indexes.push(index);
        }
        other => {
            tracing::debug!(model = %model.name, attribute = other, "block attribute has no effect on storage");
        }
    }
    Ok(())
}

/// `[a, b]` from the first positional or `fields:` argument
fn block_fields(model: &ModelBlock, attr: &Attribute) -> Result<Vec<String>, ConvertError> {
    attr.positional(0)
        .or_else(|| attr.named("fields"))
        .and_then(field_list)
        .filter(|fields| !fields.is_empty())
        .ok_or_else(|| ConvertError::InvalidAttribute {
            model: model.name.clone(),
            attribute: format!("@{}", attr.path),
            line: model.line,
            reason: "expected a list of field names".to_string(),
        })
}

/// Field names of a list; `title(sort: Desc)` contributes `title`
fn field_list(expr: &Expr) -> Option<Vec<String>> {
    let Expr::Array(items) = expr else {
        return None;
    };
    items
        .iter()
        .map(|item| match item {
            Expr::Ident(name) | Expr::Call { name, .. } => Some(name.clone()),
            _ => None,
        })
        .collect()
}

fn check_fields(model: &ModelBlock, table: &Table, attribute: &str, fields: &[String]) -> Result<(), ConvertError> {
    match fields.iter().find(|f| !table.columns.iter().any(|c| &c.name == *f)) {
        Some(missing) => Err(ConvertError::UnknownField {
            model: model.name.clone(),
            attribute: attribute.trim_start_matches('@').to_string(),
            field: missing.clone(),
            line: model.line,
        }),
        None => Ok(()),
    }
}

/// The first positional string argument, or the named one
fn string_arg(model: &ModelBlock, line: usize, attr: &Attribute, name: &str) -> Result<String, ConvertError> {
    attr.positional(0)
        .or_else(|| attr.named(name))
        .and_then(Expr::as_str)
        .map(str::to_string)
        .ok_or_else(|| ConvertError::InvalidAttribute {
            model: model.name.clone(),
            attribute: attr.path.clone(),
            line,
            reason: "expected a string argument".to_string(),
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser::parse_schema;

    fn convert(src: &str) -> Result<Schema, ConvertError> {
        to_schema(&parse_schema(src).unwrap())
    }

    #[test]
    fn test_relation_becomes_foreign_key() {
        let schema = convert(
            r#"
model User {
  id    Int    @id @default(autoincrement())
  posts Post[]
}

model Post {
  id       Int  @id
  author   User @relation(fields: [authorId], references: [id], onDelete: Cascade)
  authorId Int
}
"#,
        )
        .unwrap();

        let post = schema.get("Post").unwrap();
        assert_eq!(post.columns.len(), 2);
        assert_eq!(post.foreign_keys.len(), 1);
        let fk = &post.foreign_keys[0];
        assert_eq!(fk.referenced_table, "User");
        assert_eq!(fk.columns, vec!["authorId".to_string()]);
        assert_eq!(fk.on_delete, Some(ReferentialAction::Cascade));
        assert_eq!(fk.on_update, None);

        let user = schema.get("User").unwrap();
        assert_eq!(user.columns.len(), 1);
        assert_eq!(user.columns[0].default, Some(DefaultValue::Autoincrement));
    }

    #[test]
    fn test_enum_field_is_stored_as_string() {
        let schema = convert(
            r#"
enum Role {
  USER
  ADMIN
}

model User {
  id   Int  @id
  role Role @default(USER)
}
"#,
        )
        .unwrap();
        let role = schema.get("User").unwrap().get_column("role").unwrap();
        assert_eq!(role.ty, "String");
        assert_eq!(role.default, Some(DefaultValue::text("USER")));
    }

    #[test]
    fn test_block_attributes() {
        let schema = convert(
            r#"
model Membership {
  userId Int
  teamId Int
  email  String? @map("email_address")

  @@id([userId, teamId])
  @@unique([email], name: "membership_email_idx")
  @@index([teamId])
  @@map("memberships")
}
"#,
        )
        .unwrap();
        let table = schema.get("Membership").unwrap();
        assert_eq!(table.physical_name(), "memberships");
        assert_eq!(table.primary_key_columns().len(), 2);
        assert_eq!(table.indexes.len(), 2);
        assert!(table.indexes[0].unique);
        assert_eq!(table.indexes[0].name.as_deref(), Some("membership_email_idx"));
        assert_eq!(table.indexes[1].name, None);

        let email = table.get_column("email").unwrap();
        assert!(email.nullable);
        assert_eq!(email.physical_name(), "email_address");
    }

    #[test]
    fn test_composite_id_keeps_declared_order() {
        let schema = convert("model Membership {\n  a Int\n  b Int\n  @@id([b, a])\n}\n").unwrap();
        let table = schema.get("Membership").unwrap();
        let key: Vec<_> = table.primary_key_columns().iter().map(|c| c.name.as_str()).collect();
        assert_eq!(key, vec!["b", "a"]);
        assert!(table.columns.iter().all(|c| c.primary_key));
    }

    #[test]
    fn test_defaults() {
        let schema = convert(
            r#"
model Item {
  id      String   @id @default(cuid())
  created DateTime @default(now())
  price   Float    @default(9.5)
  stock   Int      @default(0)
  active  Boolean  @default(true)
  slug    String   @default(dbgenerated("(lower(hex(randomblob(4))))"))
}
"#,
        )
        .unwrap();
        let item = schema.get("Item").unwrap();
        let default = |name: &str| item.get_column(name).unwrap().default.clone();
        assert_eq!(
            default("id"),
            Some(DefaultValue::ClientId {
                generator: IdGenerator::Cuid
            })
        );
        assert_eq!(default("created"), Some(DefaultValue::Now));
        assert_eq!(default("price"), Some(DefaultValue::real(9.5)));
        assert_eq!(default("stock"), Some(DefaultValue::integer(0)));
        assert_eq!(default("active"), Some(DefaultValue::boolean(true)));
        assert_eq!(default("slug"), Some(DefaultValue::raw("lower(hex(randomblob(4)))")));
    }

    #[test]
    fn test_ignored_model() {
        let schema = convert("model Legacy {\n  id Int @id\n  @@ignore\n}\n").unwrap();
        assert!(schema.get("Legacy").unwrap().ignored);
    }

    #[test]
    fn test_scalar_list_is_rejected() {
        let err = convert("model Post {\n  id Int @id\n  tags String[]\n}\n").unwrap_err();
        assert_eq!(
            err,
            ConvertError::ScalarList {
                model: "Post".into(),
                field: "tags".into(),
                line: 3
            }
        );
    }

    #[test]
    fn test_index_on_unknown_field() {
        let err = convert("model Post {\n  id Int @id\n  @@index([title])\n}\n").unwrap_err();
        assert!(matches!(err, ConvertError::UnknownField { field, .. } if field == "title"));
    }

    #[test]
    fn test_unknown_default_function() {
        let err = convert("model A {\n  id Int @id @default(sequence())\n}\n").unwrap_err();
        assert!(matches!(err, ConvertError::UnsupportedDefault { line: 2, .. }));
    }
}
