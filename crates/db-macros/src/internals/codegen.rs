use proc_macro2::TokenStream;
use quote::{format_ident, quote};
use syn::{Ident, LitStr, parse_quote};

use super::types::{FieldData, TableOptions, get_option_inner_type};

fn lit(s: &str) -> LitStr {
    LitStr::new(s, proc_macro2::Span::call_site())
}

fn quoted_columns(fields: &[&FieldData]) -> String {
    fields.iter().map(|f| format!("\"{}\"", f.name)).collect::<Vec<_>>().join(", ")
}

pub fn generate_row_struct(row_struct_name: &Ident, fields_data: &[FieldData]) -> TokenStream {
    let row_fields = fields_data.iter().filter(|f| !f.is_skipped).map(|field| {
        let field_ident = format_ident!("{}", field.name);
        let row_ty: syn::Type = if field.is_text_mapped {
            if field.is_option { parse_quote!(Option<String>) } else { parse_quote!(String) }
        } else {
            field.ty.clone()
        };
        quote! { pub #field_ident: #row_ty }
    });

    quote! {
        #[derive(::sqlx::FromRow, Debug, Clone)]
        #[automatically_derived]
        pub struct #row_struct_name {
            #(#row_fields),*
        }
    }
}

fn generate_from_row_assignments(fields_data: &[FieldData]) -> Vec<TokenStream> {
    fields_data.iter().map(|field| {
        let field_ident = format_ident!("{}", field.name);
        if field.is_skipped {
            return quote! { #field_ident: Default::default() };
        }
        if field.is_text_mapped {
            let inner = get_option_inner_type(&field.ty).unwrap_or_else(|| field.ty.clone());
            if field.is_option {
                quote! { #field_ident: row.#field_ident.map(|s| s.parse().unwrap_or_else(|_| <#inner>::default())) }
            } else {
                quote! { #field_ident: row.#field_ident.parse().unwrap_or_else(|_| <#inner>::default()) }
            }
        } else {
            quote! { #field_ident: row.#field_ident }
        }
    }).collect()
}

fn generate_create_table_sql(options: &TableOptions, fields_data: &[FieldData]) -> (String, Vec<LitStr>) {
    let table = &options.table_name;
    let mut column_defs: Vec<String> = Vec::new();
    let mut foreign_keys: Vec<String> = Vec::new();
    let mut index_sqls: Vec<LitStr> = Vec::new();

    for field in fields_data.iter().filter(|f| !f.is_skipped) {
        let mut parts = vec![format!("\"{}\"", field.name)];

        if field.is_pk {
            parts.push(field.sql_type.clone());
            parts.push("PRIMARY KEY".to_string());
        } else if field.is_timestamp_column() {
            parts.push("BIGINT NOT NULL DEFAULT floor(extract(epoch from now()))".to_string());
        } else {
            parts.push(field.sql_type.clone());
            if !field.is_option {
                parts.push("NOT NULL".to_string());
            }
        }

        if field.unique {
            parts.push("UNIQUE".to_string());
        }

        if field.indexed {
            index_sqls.push(lit(&format!(
                "CREATE INDEX IF NOT EXISTS \"idx_{table}_{col}\" ON \"{table}\"(\"{col}\")",
                table = table, col = field.name
            )));
        }

        column_defs.push(parts.join(" "));

        if let Some(fk) = &field.foreign_key {
            let on_delete = fk.on_delete.clone().unwrap_or_else(|| {
                if field.is_option { "SET NULL".to_string() } else { "RESTRICT".to_string() }
            });
            foreign_keys.push(format!(
                "FOREIGN KEY (\"{}\") REFERENCES \"{}\"(\"id\") ON DELETE {} ON UPDATE CASCADE",
                field.name, fk.referenced_table, on_delete
            ));
        }
    }

    for columns in &options.unique_together {
        let quoted = columns.iter().map(|c| format!("\"{}\"", c)).collect::<Vec<_>>().join(", ");
        index_sqls.push(lit(&format!(
            "CREATE UNIQUE INDEX IF NOT EXISTS \"uq_{table}_{name}\" ON \"{table}\"({cols})",
            table = table, name = columns.join("_"), cols = quoted
        )));
    }

    for partial in &options.partial_unique {
        index_sqls.push(lit(&format!(
            "CREATE UNIQUE INDEX IF NOT EXISTS \"uq_{table}_{col}_partial\" ON \"{table}\"(\"{col}\") WHERE {predicate}",
            table = table, col = partial.column, predicate = partial.predicate
        )));
    }

    column_defs.extend(foreign_keys);
    let sql = format!("CREATE TABLE IF NOT EXISTS \"{}\" ({})", table, column_defs.join(", "));
    (sql, index_sqls)
}

pub fn generate_sqlx_schema_impl(struct_name: &Ident, row_struct_name: &Ident, options: &TableOptions, fields_data: &[FieldData]) -> TokenStream {
    let table_name = &options.table_name;
    let active_fields: Vec<&FieldData> = fields_data.iter().filter(|f| !f.is_skipped).collect();
    let writable_fields: Vec<&FieldData> = fields_data.iter().filter(|f| f.is_writable()).collect();

    let column_lits: Vec<LitStr> = active_fields.iter().map(|f| lit(&f.name)).collect();
    let from_row_assignments = generate_from_row_assignments(fields_data);

    let (create_table_sql, index_sqls) = generate_create_table_sql(options, fields_data);
    let drop_table_sql = format!("DROP TABLE IF EXISTS \"{}\" CASCADE", table_name);

    let placeholders = (1..=writable_fields.len()).map(|i| format!("${}", i)).collect::<Vec<_>>().join(", ");
    let insert_sql = format!(
        "INSERT INTO \"{}\" ({}) VALUES ({}) RETURNING {}",
        table_name, quoted_columns(&writable_fields), placeholders, quoted_columns(&active_fields)
    );

    let trigger_sql = if active_fields.iter().any(|f| f.name == "updated_at") {
        format!(
            "DROP TRIGGER IF EXISTS {trigger} ON \"{table}\"; CREATE TRIGGER {trigger} BEFORE UPDATE ON \"{table}\" FOR EACH ROW EXECUTE PROCEDURE set_updated_at_unix_timestamp();",
            trigger = format!("set_updated_at_{}", table_name),
            table = table_name
        )
    } else {
        String::new()
    };

    quote! {
        #[automatically_derived]
        impl ::crowdnest_database::SqlxSchema for #struct_name {
            type Row = #row_struct_name;

            const TABLE_NAME: &'static str = #table_name;
            const ID_COLUMN_NAME: &'static str = "id";
            const COLUMNS: &'static [&'static str] = &[#( #column_lits ),*];
            const INDEXES_SQL: &'static [&'static str] = &[#( #index_sqls ),*];

            fn get_id_value(&self) -> i64 { self.id as i64 }

            fn from_row(row: Self::Row) -> Self {
                Self {
                    #(#from_row_assignments),*
                }
            }

            fn insert_sql() -> String { #insert_sql.to_string() }
            fn create_table_sql() -> String { #create_table_sql.to_string() }
            fn drop_table_sql() -> String { #drop_table_sql.to_string() }
            fn trigger_sql() -> String { #trigger_sql.to_string() }
        }
    }
}

fn generate_bind_streams(fields_data: &[FieldData]) -> Vec<TokenStream> {
    fields_data.iter().filter(|f| f.is_writable()).map(|field| {
        let field_ident = format_ident!("{}", field.name);
        if field.is_text_mapped {
            if field.is_option {
                quote! { .bind(self.#field_ident.as_ref().map(|v| v.to_string())) }
            } else {
                quote! { .bind(self.#field_ident.to_string()) }
            }
        } else {
            quote! { .bind(self.#field_ident.clone()) }
        }
    }).collect()
}

pub fn generate_sqlx_crud_impl(struct_name: &Ident, table_name: &str, fields_data: &[FieldData]) -> TokenStream {
    let bindings = generate_bind_streams(fields_data);
    let active_fields: Vec<&FieldData> = fields_data.iter().filter(|f| !f.is_skipped).collect();
    let writable_fields: Vec<&FieldData> = fields_data.iter().filter(|f| f.is_writable()).collect();

    let set_clauses: Vec<String> = writable_fields.iter().enumerate()
        .map(|(i, f)| format!("\"{}\" = ${}", f.name, i + 1))
        .collect();
    let update_sql = if set_clauses.is_empty() {
        format!("SELECT {} FROM \"{}\" WHERE \"id\" = $1", quoted_columns(&active_fields), table_name)
    } else {
        format!(
            "UPDATE \"{}\" SET {} WHERE \"id\" = ${} RETURNING {}",
            table_name, set_clauses.join(", "), set_clauses.len() + 1, quoted_columns(&active_fields)
        )
    };
    let delete_sql = format!("DELETE FROM \"{}\" WHERE \"id\" = $1", table_name);

    let row_ty = quote! { <Self as ::crowdnest_database::SqlxSchema>::Row };
    let query_as_ty = quote! { ::sqlx::query::QueryAs<'q, ::sqlx::Postgres, #row_ty, ::sqlx::postgres::PgArguments> };

    quote! {
        #[automatically_derived]
        #[::async_trait::async_trait]
        impl ::crowdnest_database::SqlxCrud for #struct_name {
            fn bind_insert<'q>(&self, query: #query_as_ty) -> #query_as_ty {
                query #(#bindings)*
            }

            fn bind_update<'q>(&self, query: #query_as_ty) -> #query_as_ty {
                query #(#bindings)* .bind(self.id)
            }

            async fn create<'e, E>(self, executor: E) -> Result<Self, ::sqlx::Error>
            where
                E: ::sqlx::Executor<'e, Database = ::sqlx::Postgres> + Send,
                Self: Send
            {
                let sql = <Self as ::crowdnest_database::SqlxSchema>::insert_sql();
                self.bind_insert(::sqlx::query_as::<_, #row_ty>(&sql))
                    .fetch_one(executor)
                    .await
                    .map(<Self as ::crowdnest_database::SqlxSchema>::from_row)
            }

            async fn update<'e, E>(self, executor: E) -> Result<Self, ::sqlx::Error>
            where
                E: ::sqlx::Executor<'e, Database = ::sqlx::Postgres> + Send,
                Self: Send
            {
                self.bind_update(::sqlx::query_as::<_, #row_ty>(#update_sql))
                    .fetch_one(executor)
                    .await
                    .map(<Self as ::crowdnest_database::SqlxSchema>::from_row)
            }

            async fn delete<'e, E>(self, executor: E) -> Result<u64, ::sqlx::Error>
            where
                E: ::sqlx::Executor<'e, Database = ::sqlx::Postgres> + Send,
                Self: Send
            {
                ::sqlx::query(#delete_sql)
                    .bind(self.id)
                    .execute(executor)
                    .await
                    .map(|done| done.rows_affected())
            }
        }

        #[automatically_derived]
        impl ::crowdnest_database::SqlxFilterQuery for #struct_name {}
    }
}

pub fn generate_fetch_helpers(fields_data: &[FieldData]) -> TokenStream {
    let methods = fields_data.iter().filter_map(|field| {
        let fk = field.foreign_key.as_ref()?;
        let field_ident = format_ident!("{}", field.name);
        let method_name = format_ident!("fetch_{}", field.name.trim_end_matches("_id"));
        let related_type = &fk.related_rust_type;

        let lookup = quote! {
            let criteria = ::crowdnest_database::QueryCriteria::by_id(id);
            <#related_type as ::crowdnest_database::SqlxFilterQuery>::find_one_by_criteria(criteria, executor).await
        };

        let body = if field.is_option {
            quote! {
                match self.#field_ident {
                    Some(id) => { #lookup }
                    None => Ok(None),
                }
            }
        } else {
            quote! {
                let id = self.#field_ident;
                #lookup
            }
        };

        Some(quote! {
            pub async fn #method_name<'e, E>(&self, executor: E) -> Result<Option<#related_type>, ::sqlx::Error>
            where
                E: ::sqlx::Executor<'e, Database = ::sqlx::Postgres> + Send,
            {
                #body
            }
        })
    });

    quote! { #(#methods)* }
}
