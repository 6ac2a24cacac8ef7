use quote::format_ident;
use syn::{Attribute, DeriveInput, Field, Lit, Meta, NestedMeta};

use super::types::{
    FieldData, ForeignKeyInfo, PartialUnique, TableOptions,
    get_option_inner_type, is_option_type, is_simple_type, map_rust_type_to_sql,
};

fn name_value_str(nested: &NestedMeta, key: &str) -> Option<String> {
    if let NestedMeta::Meta(Meta::NameValue(mnv)) = nested {
        if mnv.path.is_ident(key) {
            if let Lit::Str(lit_str) = &mnv.lit {
                return Some(lit_str.value());
            }
        }
    }
    None
}

fn list_attr(attr: &Attribute, ident: &str) -> syn::Result<Option<syn::MetaList>> {
    if !attr.path.is_ident(ident) {
        return Ok(None);
    }
    match attr.parse_meta()? {
        Meta::List(list) => Ok(Some(list)),
        other => Err(syn::Error::new_spanned(other, format!("expected #[{}(...)]", ident))),
    }
}

pub fn parse_table_options(input: &DeriveInput) -> syn::Result<TableOptions> {
    let mut options = TableOptions::default();

    for attr in &input.attrs {
        if attr.path.is_ident("table_name") {
            match attr.parse_meta()? {
                Meta::NameValue(mnv) => match mnv.lit {
                    Lit::Str(lit_str) => options.table_name = lit_str.value(),
                    other => return Err(syn::Error::new_spanned(other, "table_name must be a string literal")),
                },
                other => return Err(syn::Error::new_spanned(other, "expected #[table_name = \"...\"]")),
            }
        } else if let Some(list) = list_attr(attr, "unique_together")? {
            let columns: Vec<String> = list.nested.iter().filter_map(|nested| match nested {
                NestedMeta::Lit(Lit::Str(lit_str)) => Some(lit_str.value()),
                _ => None,
            }).collect();
            if columns.len() < 2 {
                return Err(syn::Error::new_spanned(list, "unique_together needs at least two column names"));
            }
            options.unique_together.push(columns);
        } else if let Some(list) = list_attr(attr, "partial_unique")? {
            let column = list.nested.iter().find_map(|n| name_value_str(n, "column"));
            let predicate = list.nested.iter().find_map(|n| name_value_str(n, "predicate"));
            match (column, predicate) {
                (Some(column), Some(predicate)) => options.partial_unique.push(PartialUnique { column, predicate }),
                _ => return Err(syn::Error::new_spanned(list, "partial_unique needs `column` and `predicate`")),
            }
        }
    }

    if options.table_name.is_empty() {
        return Err(syn::Error::new_spanned(&input.ident, "SqlxObject requires #[table_name = \"...\"]"));
    }
    Ok(options)
}

pub fn parse_foreign_key_attr(field: &Field) -> syn::Result<Option<ForeignKeyInfo>> {
    for attr in field.attrs.iter() {
        if let Some(list) = list_attr(attr, "foreign_key")? {
            let referenced_table = list.nested.iter().find_map(|n| name_value_str(n, "referenced_table"));
            let related_rust_type = list.nested.iter().find_map(|n| name_value_str(n, "related_rust_type"));
            let on_delete = list.nested.iter().find_map(|n| name_value_str(n, "on_delete"));

            return match (referenced_table, related_rust_type) {
                (Some(referenced_table), Some(related_rust_type)) => Ok(Some(ForeignKeyInfo {
                    referenced_table,
                    related_rust_type: format_ident!("{}", related_rust_type),
                    on_delete,
                })),
                _ => Err(syn::Error::new_spanned(list, "foreign_key needs `referenced_table` and `related_rust_type`")),
            };
        }
    }
    Ok(None)
}

fn has_attr(field: &Field, ident: &str) -> bool {
    field.attrs.iter().any(|attr| attr.path.is_ident(ident))
}

pub fn get_fields_data(fields: &syn::punctuated::Punctuated<syn::Field, syn::Token![,]>) -> syn::Result<Vec<FieldData>> {
    fields.iter().map(|field| {
        let field_ident = field.ident.as_ref()
            .ok_or_else(|| syn::Error::new_spanned(field, "SqlxObject fields must be named"))?;
        let field_ty = &field.ty;
        let is_option = is_option_type(field_ty);
        let is_pk = field_ident == "id";
        let is_skipped = has_attr(field, "sqlx_skip_column");

        let type_for_analysis = get_option_inner_type(field_ty).unwrap_or_else(|| field_ty.clone());
        let is_text_mapped = !is_skipped && !is_pk && !is_simple_type(&type_for_analysis);

        let sql_type = if is_skipped {
            "SKIP".to_string()
        } else {
            map_rust_type_to_sql(&type_for_analysis, is_pk)
        };

        Ok(FieldData {
            name: field_ident.to_string(),
            ty: field_ty.clone(),
            is_option,
            is_pk,
            is_skipped,
            is_text_mapped,
            sql_type,
            foreign_key: parse_foreign_key_attr(field)?,
            unique: has_attr(field, "unique"),
            indexed: has_attr(field, "indexed"),
        })
    }).collect()
}
