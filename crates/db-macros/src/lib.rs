use proc_macro::TokenStream;
use quote::{format_ident, quote};
use syn::{Data, DataStruct, DeriveInput, Fields, parse_macro_input};

mod internals;

use internals::codegen::{generate_fetch_helpers, generate_row_struct, generate_sqlx_crud_impl, generate_sqlx_schema_impl};
use internals::parse::{get_fields_data, parse_table_options};

/// Derives `SqlxSchema`, `SqlxCrud` and `SqlxFilterQuery` for a struct with
/// an integer `id` primary key.
///
/// Struct attributes:
/// - `#[table_name = "..."]` (required)
/// - `#[unique_together("col_a", "col_b")]`
/// - `#[partial_unique(column = "...", predicate = "...")]`
///
/// Field attributes:
/// - `#[foreign_key(referenced_table = "...", related_rust_type = "...", on_delete = "CASCADE")]`
/// - `#[unique]`, `#[indexed]`, `#[sqlx_skip_column]`
///
/// `created_at` and `updated_at` are filled by the database. Fields whose type
/// is not a native sqlx type are stored as TEXT through `Display`/`FromStr`.
#[proc_macro_derive(SqlxObject, attributes(table_name, foreign_key, unique, indexed, sqlx_skip_column, unique_together, partial_unique))]
pub fn sqlx_object_derive(input: TokenStream) -> TokenStream {
    let input = parse_macro_input!(input as DeriveInput);
    match expand_sqlx_object(&input) {
        Ok(tokens) => tokens.into(),
        Err(err) => err.to_compile_error().into(),
    }
}

fn expand_sqlx_object(input: &DeriveInput) -> syn::Result<proc_macro2::TokenStream> {
    let struct_name = &input.ident;
    let row_struct_name = format_ident!("{}RowSqlx", struct_name);

    let named_fields = match &input.data {
        Data::Struct(DataStruct { fields: Fields::Named(fields), .. }) => &fields.named,
        _ => return Err(syn::Error::new_spanned(struct_name, "SqlxObject only supports structs with named fields")),
    };

    let options = parse_table_options(input)?;
    let fields_data = get_fields_data(named_fields)?;

    if !fields_data.iter().any(|f| f.is_pk) {
        return Err(syn::Error::new_spanned(struct_name, "SqlxObject requires an `id` field"));
    }

    let row_struct = generate_row_struct(&row_struct_name, &fields_data);
    let schema_impl = generate_sqlx_schema_impl(struct_name, &row_struct_name, &options, &fields_data);
    let crud_impl = generate_sqlx_crud_impl(struct_name, &options.table_name, &fields_data);
    let fetch_helpers = generate_fetch_helpers(&fields_data);

    Ok(quote! {
        #row_struct
        #schema_impl
        #crud_impl

        impl #struct_name {
            #fetch_helpers
        }
    })
}
