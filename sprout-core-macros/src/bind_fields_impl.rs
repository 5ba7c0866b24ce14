use proc_macro::TokenStream;
use proc_macro_error::abort;
use quote::quote;
use syn::{parse_macro_input, spanned::Spanned, Data, DeriveInput, Field, Fields, LitStr, Meta, Type};

pub(crate) fn derive_bind_fields_impl(input: TokenStream) -> TokenStream {
    let input = parse_macro_input!(input as DeriveInput);

    let name = &input.ident;
    let (impl_generics, ty_generics, where_clause) = input.generics.split_for_impl();

    let fields = match &input.data {
        Data::Struct(data_struct) => match &data_struct.fields {
            Fields::Named(fields) => fields.named.iter().collect::<Vec<_>>(),
            Fields::Unit => vec![],
            Fields::Unnamed(fields) => abort!(
                fields.span(),
                "BindFields requires a struct with named fields"
            ),
        },
        _ => abort!(input.ident.span(), "BindFields can only be derived for structs"),
    };

    let bindings = fields
        .iter()
        .filter_map(|field| inject_bean_name(field).map(|bean_name| (field, bean_name)))
        .map(|(field, bean_name)| {
            let Some(field_ident) = field.ident.as_ref() else {
                abort!(field.span(), "#[inject] requires a named field");
            };
            let field_name = field_ident.to_string();

            if !is_autowired_type(&field.ty) {
                abort!(
                    field.ty.span(),
                    "#[inject] field `{}` must be declared as `Autowired<T>`", field_name
                );
            }

            quote! {
                ::sprout_core::inject::FieldBinding::new(#bean_name, #field_name, &self.#field_ident)
            }
        })
        .collect::<Vec<_>>();

    let expanded = quote! {
        impl #impl_generics ::sprout_core::inject::BindFields for #name #ty_generics #where_clause {
            fn field_bindings(&self) -> ::std::vec::Vec<::sprout_core::inject::FieldBinding<'_>> {
                ::std::vec![#(#bindings),*]
            }
        }
    };

    TokenStream::from(expanded)
}

/// 读取 `#[inject("name")]`，裸的 `#[inject]` 使用字段名
fn inject_bean_name(field: &Field) -> Option<String> {
    let attr = field.attrs.iter().find(|attr| attr.path().is_ident("inject"))?;

    match &attr.meta {
        Meta::Path(_) => field.ident.as_ref().map(|ident| ident.to_string()),
        Meta::List(_) => match attr.parse_args::<LitStr>() {
            Ok(lit) if !lit.value().is_empty() => Some(lit.value()),
            Ok(lit) => abort!(lit.span(), "bean name in #[inject] must not be empty"),
            Err(e) => abort!(
                attr.span(),
                "expected #[inject(\"beanName\")]: {}", e
            ),
        },
        Meta::NameValue(_) => abort!(
            attr.span(),
            "expected #[inject(\"beanName\")]";
            help = "write the bean name inside parentheses"
        ),
    }
}

fn is_autowired_type(ty: &Type) -> bool {
    match ty {
        Type::Path(type_path) => type_path
            .path
            .segments
            .last()
            .is_some_and(|segment| segment.ident == "Autowired"),
        _ => false,
    }
}
