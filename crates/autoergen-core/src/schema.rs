//! Placeholder SQL schema derived from an ER specification.
//!
//! Every entity becomes a two-column table and every relationship adds one
//! referencing column to the `from` table. There is no type inference and
//! many-to-many relationships get the same single column.

use crate::{ErSpec, Relationship};

/// Render `CREATE TABLE` statements for all entities followed by one
/// `ALTER TABLE` per relationship, in input order, separated by blank lines.
pub fn synthesize(spec: &ErSpec) -> String {
    let tables = spec.entities().iter().map(|entity| create_table(entity));
    let alters = spec.relationships().iter().map(add_reference);
    tables.chain(alters).collect::<Vec<_>>().join("\n\n")
}

fn create_table(entity: &str) -> String {
    format!("CREATE TABLE {entity} (\n    id INT PRIMARY KEY,\n    name VARCHAR(100)\n);")
}

fn add_reference(rel: &Relationship) -> String {
    format!(
        "-- {note}\nALTER TABLE {from} ADD COLUMN {column}_id INT REFERENCES {to}(id);",
        from = rel.from,
        note = single_line(&format!("{} {} {}", rel.from, rel.relation, rel.to)),
        to = rel.to,
        column = rel.to.to_lowercase(),
    )
}

/// `--` comments end at a line break.
fn single_line(text: &str) -> String {
    text.replace(['\r', '\n'], " ")
}
