//! Parser combinators using nom
//!
//! Block parsers take the whole source next to the remaining input so nodes
//! can record their line, and errors can point at the offending spot.

use nom::{
    IResult, Parser,
    branch::alt,
    bytes::complete::{tag, take_till, take_while, take_while1},
    character::complete::{char, digit1, multispace1, space0},
    combinator::{cut, map, opt, recognize, success, value},
    error::{Error, ErrorKind},
    multi::{many0, separated_list0},
    sequence::{delimited, pair, preceded, terminated},
};

use super::SchemaParseError;
use super::ast::{
    Argument, Attribute, ConfigBlock, Declaration, EnumBlock, Expr, Field, FieldType, Member,
    ModelBlock, SchemaDocument, TypeKind, TypeModifier,
};

// =============================================================================
// Basic Combinators
// =============================================================================

/// `// ...` up to the end of the line (doc comments included)
fn comment(input: &str) -> IResult<&str, &str> {
    recognize(pair(tag("//"), take_till(|c| c == '\n'))).parse(input)
}

/// Whitespace and comments, possibly spanning lines
fn ws(input: &str) -> IResult<&str, ()> {
    value((), many0(alt((multispace1, comment)))).parse(input)
}

/// Identifier: letter or underscore, then alphanumerics and underscores
fn identifier(input: &str) -> IResult<&str, &str> {
    recognize(pair(
        take_while1(|c: char| c.is_alphabetic() || c == '_'),
        take_while(|c: char| c.is_alphanumeric() || c == '_'),
    ))
    .parse(input)
}

/// `db.VarChar`, `env`, ...
fn dotted_path(input: &str) -> IResult<&str, &str> {
    recognize(pair(identifier, many0(pair(char('.'), identifier)))).parse(input)
}

fn close_brace(input: &str) -> IResult<&str, char> {
    char('}').parse(input)
}

/// Double-quoted string with backslash escapes
fn string_literal(input: &str) -> IResult<&str, String> {
    let (rest, _) = char('"').parse(input)?;
    let mut out = String::new();
    let mut chars = rest.char_indices();
    loop {
        match chars.next() {
            Some((i, '"')) => return Ok((&rest[i + 1..], out)),
            Some((_, '\\')) => match chars.next() {
                Some((_, 'n')) => out.push('\n'),
                Some((_, 't')) => out.push('\t'),
                Some((_, c)) => out.push(c),
                None => break,
            },
            Some((_, '\n')) | None => break,
            Some((_, c)) => out.push(c),
        }
    }
    Err(nom::Err::Failure(Error::new(input, ErrorKind::Char)))
}

fn number(input: &str) -> IResult<&str, &str> {
    recognize((opt(char('-')), digit1, opt(pair(char('.'), digit1)))).parse(input)
}

/// `,` surrounded by whitespace
fn comma(input: &str) -> IResult<&str, ()> {
    value((), delimited(ws, char(','), ws)).parse(input)
}

// =============================================================================
// Expressions
// =============================================================================

fn expr(input: &str) -> IResult<&str, Expr> {
    alt((
        map(string_literal, Expr::String),
        map(number, |n: &str| Expr::Number(n.to_string())),
        array,
        call_or_ident,
    ))
    .parse(input)
}

fn array(input: &str) -> IResult<&str, Expr> {
    let (input, _) = char('[').parse(input)?;
    cut(array_tail).parse(input)
}

fn array_tail(input: &str) -> IResult<&str, Expr> {
    let (input, _) = ws(input)?;
    let (input, items) = separated_list0(comma, expr).parse(input)?;
    let (input, _) = ws(input)?;
    let (input, _) = opt(char(',')).parse(input)?;
    let (input, _) = ws(input)?;
    let (input, _) = char(']').parse(input)?;
    Ok((input, Expr::Array(items)))
}

fn call_or_ident(input: &str) -> IResult<&str, Expr> {
    let (input, name) = dotted_path(input)?;
    let (input, args) = opt(arguments).parse(input)?;
    let expr = match (name, args) {
        (_, Some(args)) => Expr::Call {
            name: name.to_string(),
            args,
        },
        ("true", None) => Expr::Boolean(true),
        ("false", None) => Expr::Boolean(false),
        (_, None) => Expr::Ident(name.to_string()),
    };
    Ok((input, expr))
}

/// `name: value` or a positional `value`
fn argument(input: &str) -> IResult<&str, Argument> {
    let (input, name) = opt(terminated(identifier, (ws, char(':'), ws))).parse(input)?;
    let (input, value) = expr(input)?;
    Ok((
        input,
        Argument {
            name: name.map(str::to_string),
            value,
        },
    ))
}

/// Parenthesised argument list; a trailing comma is allowed
fn arguments(input: &str) -> IResult<&str, Vec<Argument>> {
    let (input, _) = char('(').parse(input)?;
    cut(arguments_tail).parse(input)
}

fn arguments_tail(input: &str) -> IResult<&str, Vec<Argument>> {
    let (input, _) = ws(input)?;
    let (input, args) = separated_list0(comma, argument).parse(input)?;
    let (input, _) = ws(input)?;
    let (input, _) = opt(char(',')).parse(input)?;
    let (input, _) = ws(input)?;
    let (input, _) = char(')').parse(input)?;
    Ok((input, args))
}

// =============================================================================
// Fields and Attributes
// =============================================================================

/// Attribute path and arguments, after the `@` or `@@`
fn attribute_body(input: &str) -> IResult<&str, Attribute> {
    let (input, path) = dotted_path(input)?;
    let (input, args) = opt(arguments).parse(input)?;
    Ok((
        input,
        Attribute {
            path: path.to_string(),
            args: args.unwrap_or_default(),
        },
    ))
}

/// Attributes following a field or enum value on the same line
fn field_attributes(input: &str) -> IResult<&str, Vec<Attribute>> {
    many0(preceded((space0, char('@')), attribute_body)).parse(input)
}

fn field_type(input: &str) -> IResult<&str, FieldType> {
    let (input, name) = dotted_path(input)?;
    let (input, kind) = if name == "Unsupported" {
        let (input, inner) =
            delimited((char('('), ws), string_literal, (ws, char(')'))).parse(input)?;
        (input, TypeKind::Unsupported(inner))
    } else {
        (input, TypeKind::Named(name.to_string()))
    };
    let (input, modifier) = alt((
        value(TypeModifier::List, tag("[]")),
        value(TypeModifier::Optional, char('?')),
        success(TypeModifier::Required),
    ))
    .parse(input)?;
    Ok((input, FieldType { kind, modifier }))
}

fn field<'a>(src: &'a str, input: &'a str) -> IResult<&'a str, Field> {
    let line = position(src, input).0;
    let (input, name) = identifier(input)?;
    let (input, _) = space0.parse(input)?;
    let (input, ty) = field_type(input)?;
    let (input, attributes) = field_attributes(input)?;
    Ok((
        input,
        Field {
            name: name.to_string(),
            ty,
            attributes,
            line,
        },
    ))
}

fn member<'a>(src: &'a str, input: &'a str) -> IResult<&'a str, Member> {
    if let Some(rest) = input.strip_prefix("@@") {
        let (rest, attr) = attribute_body(rest)?;
        return Ok((rest, Member::BlockAttribute(attr)));
    }
    let (input, field) = field(src, input)?;
    Ok((input, Member::Field(field)))
}

// =============================================================================
// Blocks
// =============================================================================

/// `keyword Name {`, leaving the input after the opening brace
fn block_header<'a>(keyword: &'static str, input: &'a str) -> IResult<&'a str, &'a str> {
    let (input, _) = tag(keyword).parse(input)?;
    let (input, _) = multispace1.parse(input)?;
    let (input, name) = identifier(input)?;
    let (input, _) = ws(input)?;
    let (input, _) = char('{').parse(input)?;
    Ok((input, name))
}

fn model<'a>(src: &'a str, input: &'a str) -> IResult<&'a str, ModelBlock> {
    let line = position(src, input).0;
    let (mut input, name) = block_header("model", input)?;
    let mut members = Vec::new();
    loop {
        let (rest, _) = ws(input)?;
        if let Ok((rest, _)) = close_brace(rest) {
            let block = ModelBlock {
                name: name.to_string(),
                members,
                line,
            };
            return Ok((rest, block));
        }
        let (rest, member) = member(src, rest)?;
        members.push(member);
        input = rest;
    }
}

fn enum_block(input: &str) -> IResult<&str, EnumBlock> {
    let (mut input, name) = block_header("enum", input)?;
    let mut values = Vec::new();
    loop {
        let (rest, _) = ws(input)?;
        if let Ok((rest, _)) = close_brace(rest) {
            let block = EnumBlock {
                name: name.to_string(),
                values,
            };
            return Ok((rest, block));
        }
        input = if let Some(rest) = rest.strip_prefix("@@") {
            attribute_body(rest)?.0
        } else {
            let (rest, value) = identifier(rest)?;
            let (rest, _) = field_attributes(rest)?;
            values.push(value.to_string());
            rest
        };
    }
}

fn config_block<'a>(keyword: &'static str, input: &'a str) -> IResult<&'a str, ConfigBlock> {
    let (mut input, name) = block_header(keyword, input)?;
    let mut entries = Vec::new();
    loop {
        let (rest, _) = ws(input)?;
        if let Ok((rest, _)) = close_brace(rest) {
            let block = ConfigBlock {
                name: name.to_string(),
                entries,
            };
            return Ok((rest, block));
        }
        let (rest, key) = identifier(rest)?;
        let (rest, _) = delimited(ws, char('='), ws).parse(rest)?;
        let (rest, value) = expr(rest)?;
        entries.push((key.to_string(), value));
        input = rest;
    }
}

fn declaration<'a>(src: &'a str, input: &'a str) -> IResult<&'a str, Declaration> {
    let (_, keyword) = identifier(input)?;
    match keyword {
        "model" => model(src, input).map(|(rest, m)| (rest, Declaration::Model(m))),
        "enum" => map(enum_block, Declaration::Enum).parse(input),
        "datasource" => {
            config_block("datasource", input).map(|(rest, c)| (rest, Declaration::Datasource(c)))
        }
        "generator" => {
            config_block("generator", input).map(|(rest, c)| (rest, Declaration::Generator(c)))
        }
        _ => Err(nom::Err::Error(Error::new(input, ErrorKind::Tag))),
    }
}

// =============================================================================
// Document
// =============================================================================

/// 1-based line and column of `rest` inside `src`
pub(crate) fn position(src: &str, rest: &str) -> (usize, usize) {
    let offset = src.len().saturating_sub(rest.len());
    let consumed = &src[..offset];
    let line = consumed.matches('\n').count() + 1;
    let column = match consumed.rfind('\n') {
        Some(nl) => offset - nl,
        None => offset + 1,
    };
    (line, column)
}

fn error_at(src: &str, err: nom::Err<Error<&str>>) -> SchemaParseError {
    let rest = match err {
        nom::Err::Error(e) | nom::Err::Failure(e) => e.input,
        nom::Err::Incomplete(_) => "",
    };
    let (line, column) = position(src, rest);
    let near: String = rest.chars().take_while(|c| *c != '\n').take(24).collect();
    let message = if near.trim().is_empty() {
        "unexpected end of input".to_string()
    } else {
        format!("unexpected `{}`", near.trim_end())
    };
    SchemaParseError {
        line,
        column,
        message,
    }
}

/// Parse a whole schema document
pub fn parse_document(src: &str) -> Result<SchemaDocument, SchemaParseError> {
    let mut input = src;
    let mut declarations = Vec::new();
    loop {
        let (rest, _) = ws(input).map_err(|e| error_at(src, e))?;
        if rest.is_empty() {
            return Ok(SchemaDocument { declarations });
        }
        let (rest, decl) = declaration(src, rest).map_err(|e| error_at(src, e))?;
        declarations.push(decl);
        input = rest;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_position() {
        let src = "ab\ncde\nf";
        assert_eq!(position(src, src), (1, 1));
        assert_eq!(position(src, &src[4..]), (2, 2));
        assert_eq!(position(src, &src[7..]), (3, 1));
    }

    #[test]
    fn test_string_escapes() {
        let (rest, s) = string_literal(r#""a \"b\" c" tail"#).unwrap();
        assert_eq!(s, "a \"b\" c");
        assert_eq!(rest, " tail");
        assert!(string_literal("\"open").is_err());
    }

    #[test]
    fn test_expressions() {
        assert_eq!(expr("42").unwrap().1, Expr::Number("42".into()));
        assert_eq!(expr("-1.5").unwrap().1, Expr::Number("-1.5".into()));
        assert_eq!(expr("true").unwrap().1, Expr::Boolean(true));
        assert_eq!(expr("Cascade").unwrap().1, Expr::Ident("Cascade".into()));
        assert_eq!(
            expr("now()").unwrap().1,
            Expr::Call {
                name: "now".into(),
                args: vec![]
            }
        );
        assert_eq!(
            expr("[a, b,]").unwrap().1,
            Expr::Array(vec![Expr::Ident("a".into()), Expr::Ident("b".into())])
        );
    }

    #[test]
    fn test_named_arguments() {
        let (_, args) = arguments(r#"(fields: [authorId], references: [id], onDelete: Cascade)"#).unwrap();
        assert_eq!(args.len(), 3);
        assert_eq!(args[0].name.as_deref(), Some("fields"));
        assert_eq!(args[2].value, Expr::Ident("Cascade".into()));
    }

    #[test]
    fn test_field_type_modifiers() {
        let (_, ty) = field_type("String?").unwrap();
        assert_eq!(ty.modifier, TypeModifier::Optional);
        let (_, ty) = field_type("Post[]").unwrap();
        assert_eq!(ty.modifier, TypeModifier::List);
        let (_, ty) = field_type(r#"Unsupported("circle")"#).unwrap();
        assert_eq!(ty.kind, TypeKind::Unsupported("circle".into()));
    }

    #[test]
    fn test_field_with_attributes() {
        let src = "email String @unique @map(\"email_address\") // trailing";
        let (rest, field) = field(src, src).unwrap();
        assert_eq!(field.name, "email");
        assert_eq!(field.attributes.len(), 2);
        assert_eq!(field.attributes[1].path, "map");
        assert_eq!(rest, " // trailing");
    }

    #[test]
    fn test_error_points_at_offending_line() {
        let src = "model User {\n  id Int @id\n  name String @default(\n}\n";
        let err = parse_document(src).unwrap_err();
        assert_eq!(err.line, 4);
    }

    #[test]
    fn test_unknown_block_keyword() {
        let err = parse_document("\n\nview Foo {}").unwrap_err();
        assert_eq!((err.line, err.column), (3, 1));
    }
}
