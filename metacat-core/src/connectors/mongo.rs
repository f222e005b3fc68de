//! MongoDB connector.
//!
//! MongoDB has no schema catalog to read, so introspection samples one
//! document from the collection and derives a column descriptor per field.

use mongodb::bson::{doc, Bson, Document};
use mongodb::options::{ClientOptions, Credential, ServerAddress};
use mongodb::Client;

use crate::models::{ColumnSpec, ConnectionRecord, ConnectionTestResult};

fn client(conn: &ConnectionRecord, password: Option<&str>) -> Result<Client, String> {
    let address = ServerAddress::Tcp {
        host: conn.host.clone(),
        port: conn.port,
    };
    let mut options = ClientOptions::builder().hosts(vec![address]).build();
    if let Some(username) = &conn.username {
        options.credential = Some(
            Credential::builder()
                .username(username.clone())
                .password(password.map(String::from))
                .build(),
        );
    }
    Client::with_options(options).map_err(|e| e.to_string())
}

/// Handshake-only probe; lists database names to force a round trip.
pub async fn probe(conn: &ConnectionRecord, password: Option<&str>) -> ConnectionTestResult {
    let client = match client(conn, password) {
        Ok(client) => client,
        Err(reason) => return ConnectionTestResult::failed(reason),
    };
    match client.list_database_names().await {
        Ok(_) => ConnectionTestResult::ok(),
        Err(e) => ConnectionTestResult::failed(e.to_string()),
    }
}

/// Derives column descriptors from one sampled document.
pub async fn introspect(
    conn: &ConnectionRecord,
    password: Option<&str>,
    database_name: &str,
    table_name: &str,
) -> Result<Vec<ColumnSpec>, String> {
    let client = client(conn, password)?;
    let collection = client
        .database(database_name)
        .collection::<Document>(table_name);

    let sample = collection
        .find_one(doc! {})
        .await
        .map_err(|e| e.to_string())?
        .ok_or_else(|| format!("collection '{}' is empty or missing", table_name))?;

    let mut columns = Vec::with_capacity(sample.len());
    for (position, (field, value)) in sample.iter().enumerate() {
        columns.push(ColumnSpec {
            column_name: field.clone(),
            display_name: None,
            data_type: bson_type_name(value).to_string(),
            ordinal_position: i32::try_from(position + 1).unwrap_or(i32::MAX),
            is_nullable: Some("YES".to_string()),
            column_default: None,
            description: None,
        });
    }
    Ok(columns)
}

fn bson_type_name(value: &Bson) -> &'static str {
    match value {
        Bson::Double(_) => "double",
        Bson::String(_) => "string",
        Bson::Array(_) => "array",
        Bson::Document(_) => "object",
        Bson::Boolean(_) => "bool",
        Bson::Int32(_) | Bson::Int64(_) => "int",
        Bson::DateTime(_) => "date",
        Bson::ObjectId(_) => "objectId",
        Bson::Decimal128(_) => "decimal",
        Bson::Null => "null",
        _ => "mixed",
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bson_type_names() {
        assert_eq!(bson_type_name(&Bson::String("x".into())), "string");
        assert_eq!(bson_type_name(&Bson::Int64(7)), "int");
        assert_eq!(bson_type_name(&Bson::Boolean(true)), "bool");
        assert_eq!(bson_type_name(&Bson::Null), "null");
    }
}
