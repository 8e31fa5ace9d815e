//! DDL and fixed DML templates compiled from a table descriptor.
//!
//! Every template binds its arguments positionally in column declaration
//! order.

use crate::entity::IndexMarker;
use crate::error::{OrmError, Result};
use crate::schema::ColumnDescriptor;

/// Precompiled statements stored on each table descriptor.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Statements {
    pub insert: String,
    pub update: Option<String>,
    pub delete: String,
    pub get: String,
    pub get_where: String,
    pub upsert: String,
}

pub fn compile_statements<E>(table: &str, columns: &[ColumnDescriptor<E>]) -> Statements {
    let get_where = key_condition(columns);
    Statements {
        insert: insert(table, columns),
        update: update(table, columns, &get_where),
        delete: format!("DELETE FROM {table} WHERE {get_where}"),
        get: format!(
            "SELECT {} FROM {table} WHERE {get_where}",
            column_list(columns.iter())
        ),
        upsert: upsert(table, columns),
        get_where,
    }
}

/// `name = ? AND ...` over the primary key columns.
fn key_condition<E>(columns: &[ColumnDescriptor<E>]) -> String {
    assignments(columns.iter().filter(|c| c.primary_key), " AND ")
}

fn assignments<'a, E: 'a>(
    columns: impl Iterator<Item = &'a ColumnDescriptor<E>>,
    separator: &str,
) -> String {
    columns
        .map(|column| format!("{} = ?", column.name))
        .collect::<Vec<_>>()
        .join(separator)
}

fn column_list<'a, E: 'a>(columns: impl Iterator<Item = &'a ColumnDescriptor<E>>) -> String {
    columns
        .map(|column| column.name.as_str())
        .collect::<Vec<_>>()
        .join(", ")
}

fn insert<E>(table: &str, columns: &[ColumnDescriptor<E>]) -> String {
    let placeholders = vec!["?"; columns.len()].join(", ");
    format!(
        "INSERT INTO {table} ({}) VALUES ({placeholders})",
        column_list(columns.iter())
    )
}

fn update<E>(table: &str, columns: &[ColumnDescriptor<E>], get_where: &str) -> Option<String> {
    let set = assignments(columns.iter().filter(|c| !c.primary_key), ", ");
    if set.is_empty() {
        return None;
    }
    Some(format!("UPDATE {table} SET {set} WHERE {get_where}"))
}

fn upsert<E>(table: &str, columns: &[ColumnDescriptor<E>]) -> String {
    let keys = column_list(columns.iter().filter(|c| c.primary_key));
    let set = columns
        .iter()
        .filter(|c| !c.primary_key)
        .map(|c| format!("{0} = excluded.{0}", c.name))
        .collect::<Vec<_>>();
    let action = if set.is_empty() {
        "DO NOTHING".to_string()
    } else {
        format!("DO UPDATE SET {}", set.join(", "))
    };
    format!("{} ON CONFLICT ({keys}) {action}", insert(table, columns))
}

/// `CREATE TABLE IF NOT EXISTS` plus one `CREATE [UNIQUE] INDEX` per group.
///
/// Index groups are emitted in order of first declaration; their columns
/// keep declaration order.
pub fn create_table<E>(table: &str, columns: &[ColumnDescriptor<E>]) -> Result<Vec<String>> {
    let primary_key = column_list(columns.iter().filter(|c| c.primary_key));
    if primary_key.is_empty() {
        return Err(OrmError::Configuration(format!(
            "You must define a primary key for table [{table}]."
        )));
    }

    let indexes = index_groups(columns, |c| c.index.as_ref());
    let unique_indexes = index_groups(columns, |c| c.unique_index.as_ref());
    if let Some((name, _)) = indexes
        .iter()
        .find(|(name, _)| unique_indexes.iter().any(|(unique, _)| unique == name))
    {
        return Err(OrmError::Configuration(format!(
            "Entity [{table}] has index [{name}] which conflicts with the name of a unique index."
        )));
    }

    let definitions = columns
        .iter()
        .map(|column| {
            let mut definition = format!("{} {}", column.name, column.storage_class);
            if column.unique {
                definition.push_str(" UNIQUE");
            }
            definition
        })
        .collect::<Vec<_>>()
        .join(", ");

    let mut statements = vec![format!(
        "CREATE TABLE IF NOT EXISTS {table} ({definitions}, PRIMARY KEY ({primary_key}));"
    )];
    for (name, members) in indexes {
        statements.push(format!(
            "CREATE INDEX {name} ON {table} ({});",
            members.join(", ")
        ));
    }
    for (name, members) in unique_indexes {
        statements.push(format!(
            "CREATE UNIQUE INDEX {name} ON {table} ({});",
            members.join(", ")
        ));
    }
    Ok(statements)
}

pub fn drop_table(table: &str) -> String {
    format!("DROP TABLE IF EXISTS {table}")
}

fn index_groups<E>(
    columns: &[ColumnDescriptor<E>],
    marker: impl Fn(&ColumnDescriptor<E>) -> Option<&IndexMarker>,
) -> Vec<(String, Vec<String>)> {
    let mut groups: Vec<(String, Vec<String>)> = Vec::new();
    for column in columns {
        let Some(index) = marker(column) else {
            continue;
        };
        let member = match index.order {
            Some(order) => format!("{} {}", column.name, order.as_sql()),
            None => column.name.clone(),
        };
        match groups.iter_mut().find(|(name, _)| *name == index.name) {
            Some((_, members)) => members.push(member),
            None => groups.push((index.name.clone(), vec![member])),
        }
    }
    groups
}

#[cfg(test)]
mod tests {
    use crate::entity::{Column, Entity, EntitySchema, SortOrder};
    use crate::error::OrmError;
    use crate::schema::introspect;
    use crate::types::TypeRegistry;

    #[derive(Default)]
    struct User {
        id: i64,
        name: String,
        score: f64,
    }

    impl Entity for User {
        fn schema() -> EntitySchema<Self> {
            EntitySchema::new()
                .table("users")
                .column(Column::new("id", |u: &User| &u.id, |u: &mut User, v: i64| u.id = v).primary_key())
                .column(
                    Column::new("name", |u: &User| &u.name, |u: &mut User, v: String| u.name = v)
                        .unique()
                        .index("idx_user_name_score"),
                )
                .column(
                    Column::new("score", |u: &User| &u.score, |u: &mut User, v: f64| u.score = v)
                        .index_ordered("idx_user_name_score", SortOrder::Desc),
                )
        }
    }

    #[derive(Default)]
    struct Membership {
        group_id: i32,
        user_id: i32,
        role: String,
    }

    impl Entity for Membership {
        fn schema() -> EntitySchema<Self> {
            EntitySchema::new()
                .column(
                    Column::new("group_id", |m: &Membership| &m.group_id, |m: &mut Membership, v: i32| m.group_id = v)
                        .primary_key()
                        .unique_index("uq_member"),
                )
                .column(
                    Column::new("user_id", |m: &Membership| &m.user_id, |m: &mut Membership, v: i32| m.user_id = v)
                        .primary_key()
                        .unique_index("uq_member")
                        .references("users", "id"),
                )
                .column(Column::new("role", |m: &Membership| &m.role, |m: &mut Membership, v: String| m.role = v))
        }
    }

    #[derive(Default)]
    struct Clashing {
        id: i64,
        a: String,
        b: String,
    }

    impl Entity for Clashing {
        fn schema() -> EntitySchema<Self> {
            EntitySchema::new()
                .column(Column::new("id", |c: &Clashing| &c.id, |c: &mut Clashing, v: i64| c.id = v).primary_key())
                .column(Column::new("a", |c: &Clashing| &c.a, |c: &mut Clashing, v: String| c.a = v).index("idx_ab"))
                .column(
                    Column::new("b", |c: &Clashing| &c.b, |c: &mut Clashing, v: String| c.b = v)
                        .unique_index("idx_ab"),
                )
        }
    }

    #[derive(Default)]
    struct Tag {
        label: String,
    }

    impl Entity for Tag {
        fn schema() -> EntitySchema<Self> {
            EntitySchema::new().column(
                Column::new("label", |t: &Tag| &t.label, |t: &mut Tag, v: String| t.label = v).primary_key(),
            )
        }
    }

    #[test]
    fn create_table_with_index_group() {
        let descriptor = introspect::<User>(&TypeRegistry::with_defaults()).unwrap();
        let ddl = descriptor.create_table_sql().unwrap();
        assert_eq!(
            ddl,
            vec![
                "CREATE TABLE IF NOT EXISTS users (id NUMERIC, name TEXT UNIQUE, score REAL, PRIMARY KEY (id));"
                    .to_string(),
                "CREATE INDEX idx_user_name_score ON users (name, score DESC);".to_string(),
            ]
        );
    }

    #[test]
    fn single_key_templates() {
        let descriptor = introspect::<User>(&TypeRegistry::with_defaults()).unwrap();
        assert_eq!(
            descriptor.insert_sql(),
            "INSERT INTO users (id, name, score) VALUES (?, ?, ?)"
        );
        assert_eq!(
            descriptor.update_sql(),
            Some("UPDATE users SET name = ?, score = ? WHERE id = ?")
        );
        assert_eq!(descriptor.delete_sql(), "DELETE FROM users WHERE id = ?");
        assert_eq!(
            descriptor.get_sql(),
            "SELECT id, name, score FROM users WHERE id = ?"
        );
        assert_eq!(
            descriptor.upsert_sql(),
            "INSERT INTO users (id, name, score) VALUES (?, ?, ?) \
             ON CONFLICT (id) DO UPDATE SET name = excluded.name, score = excluded.score"
        );
    }

    #[test]
    fn composite_keys_are_joined_with_and() {
        let descriptor = introspect::<Membership>(&TypeRegistry::with_defaults()).unwrap();
        assert_eq!(descriptor.get_where_clause(), "group_id = ? AND user_id = ?");
        assert_eq!(
            descriptor.delete_sql(),
            "DELETE FROM Membership WHERE group_id = ? AND user_id = ?"
        );
        assert_eq!(
            descriptor.update_sql(),
            Some("UPDATE Membership SET role = ? WHERE group_id = ? AND user_id = ?")
        );

        let ddl = descriptor.create_table_sql().unwrap();
        assert_eq!(
            ddl[0],
            "CREATE TABLE IF NOT EXISTS Membership (group_id INTEGER, user_id INTEGER, role TEXT, \
             PRIMARY KEY (group_id, user_id));"
        );
        assert_eq!(
            ddl[1],
            "CREATE UNIQUE INDEX uq_member ON Membership (group_id, user_id);"
        );
        assert!(!ddl[0].contains("REFERENCES"));
    }

    #[test]
    fn index_name_collision_fails() {
        let descriptor = introspect::<Clashing>(&TypeRegistry::with_defaults()).unwrap();
        let error = descriptor.create_table_sql().unwrap_err();
        assert!(matches!(error, OrmError::Configuration(message) if message.contains("[idx_ab]")));
    }

    #[test]
    fn key_only_entity_has_no_update_and_ignores_conflicts() {
        let descriptor = introspect::<Tag>(&TypeRegistry::with_defaults()).unwrap();
        assert_eq!(descriptor.update_sql(), None);
        assert!(descriptor.upsert_sql().ends_with("ON CONFLICT (label) DO NOTHING"));
        assert_eq!(descriptor.drop_table_sql(), "DROP TABLE IF EXISTS Tag");
    }
}
