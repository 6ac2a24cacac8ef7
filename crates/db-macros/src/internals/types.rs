use quote::ToTokens;
use syn::{GenericArgument, PathArguments, Type};

#[derive(Debug)]
pub struct ForeignKeyInfo {
    pub referenced_table: String,
    pub related_rust_type: syn::Ident,
    pub on_delete: Option<String>,
}

/// Struct-level options collected from `#[table_name]`, `#[unique_together]`
/// and `#[partial_unique]`.
#[derive(Debug, Default)]
pub struct TableOptions {
    pub table_name: String,
    pub unique_together: Vec<Vec<String>>,
    pub partial_unique: Vec<PartialUnique>,
}

#[derive(Debug)]
pub struct PartialUnique {
    pub column: String,
    pub predicate: String,
}

pub struct FieldData {
    pub name: String,
    pub ty: syn::Type,
    pub is_option: bool,
    pub is_pk: bool,
    pub is_skipped: bool,
    pub is_text_mapped: bool,
    pub sql_type: String,
    pub foreign_key: Option<ForeignKeyInfo>,
    pub unique: bool,
    pub indexed: bool,
}

impl FieldData {
    pub fn is_timestamp_column(&self) -> bool {
        self.name == "created_at" || self.name == "updated_at"
    }

    /// Columns the caller supplies on insert and update.
    pub fn is_writable(&self) -> bool {
        !self.is_skipped && !self.is_pk && !self.is_timestamp_column()
    }
}

impl std::fmt::Debug for FieldData {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FieldData")
            .field("name", &self.name)
            .field("ty", &self.ty.to_token_stream().to_string())
            .field("is_option", &self.is_option)
            .field("is_pk", &self.is_pk)
            .field("is_skipped", &self.is_skipped)
            .field("is_text_mapped", &self.is_text_mapped)
            .field("sql_type", &self.sql_type)
            .field("foreign_key", &self.foreign_key)
            .field("unique", &self.unique)
            .field("indexed", &self.indexed)
            .finish()
    }
}

pub fn is_option_type(ty: &Type) -> bool {
    get_option_inner_type(ty).is_some()
}

pub fn get_option_inner_type(ty: &Type) -> Option<Type> {
    if let Type::Path(type_path) = ty {
        if let Some(last_segment) = type_path.path.segments.last() {
            if last_segment.ident == "Option" {
                if let PathArguments::AngleBracketed(angle_args) = &last_segment.arguments {
                    if angle_args.args.len() == 1 {
                        if let GenericArgument::Type(inner_ty) = &angle_args.args[0] {
                            return Some(inner_ty.clone());
                        }
                    }
                }
            }
        }
    }
    None
}

pub fn get_fully_qualified_type_string(ty: &Type) -> String {
    quote::quote!(#ty).to_string().replace(' ', "")
}

fn is_json_type(type_str: &str) -> bool {
    type_str.starts_with("Json<") || type_str.starts_with("::sqlx::types::Json<") || type_str.starts_with("sqlx::types::Json<")
}

/// Types sqlx encodes natively. Anything else is treated as a text-mapped
/// enum (Display + FromStr + Default).
pub fn is_simple_type(ty: &Type) -> bool {
    let type_str = get_fully_qualified_type_string(ty);
    matches!(type_str.as_str(),
        "String" | "i16" | "i32" | "i64" | "f32" | "f64" | "bool" |
        "Vec<u8>" | "Vec<String>" | "Vec<i64>" |
        "Decimal" | "rust_decimal::Decimal" | "::rust_decimal::Decimal"
    ) || is_json_type(&type_str)
}

pub fn map_rust_type_to_sql(ty: &Type, is_pk: bool) -> String {
    let type_str = get_fully_qualified_type_string(ty);

    if is_pk {
        return match type_str.as_str() {
            "i64" => "BIGSERIAL".to_string(),
            "i32" => "SERIAL".to_string(),
            _ => panic!("SqlxObject primary key `id` must be i32 or i64, found '{}'", type_str),
        };
    }

    match type_str.as_str() {
        "String" => "TEXT".to_string(),
        "i16" => "SMALLINT".to_string(),
        "i32" => "INTEGER".to_string(),
        "i64" => "BIGINT".to_string(),
        "f32" => "REAL".to_string(),
        "f64" => "DOUBLE PRECISION".to_string(),
        "bool" => "BOOLEAN".to_string(),
        "Vec<u8>" => "BYTEA".to_string(),
        "Vec<String>" => "TEXT[]".to_string(),
        "Vec<i64>" => "BIGINT[]".to_string(),
        "Decimal" | "rust_decimal::Decimal" | "::rust_decimal::Decimal" => "NUMERIC(18,2)".to_string(),
        s if is_json_type(s) => "JSONB".to_string(),
        s if !s.starts_with("Option<") && !s.starts_with("Vec<") => "TEXT".to_string(),
        _ => panic!(
            "Unsupported Rust type for SQL mapping: '{}'. Use a primitive, Decimal, Json<T>, or an enum deriving Display, FromStr and Default.",
            type_str
        ),
    }
}
