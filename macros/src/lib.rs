use proc_macro::TokenStream;
use quote::quote;
use syn::{parse_macro_input, Data, DeriveInput, Fields};

/// Implements `entity_store::Component` for a type.
///
/// For structs, the generated `fields()` describes every field: its name (or position for tuple
/// structs), type name, byte offset and size. Enums and unions report no fields.
#[proc_macro_derive(Component)]
pub fn derive_component_fn(input: TokenStream) -> TokenStream {
    let main_crate = quote!(::entity_store);

    let DeriveInput {
        ident,
        data,
        generics,
        ..
    } = parse_macro_input!(input as DeriveInput);

    let (impl_generics, ty_generics, where_clause) = generics.split_for_impl();

    let fields = match data {
        Data::Struct(data) => data.fields,
        Data::Enum(_) | Data::Union(_) => Fields::Unit,
    };

    let field_infos: Vec<_> = fields
        .iter()
        .enumerate()
        .map(|(i, field)| {
            let field_ty = &field.ty;

            let (name, member) = match &field.ident {
                Some(field_ident) => (field_ident.to_string(), quote!(#field_ident)),
                None => {
                    let index = syn::Index::from(i);
                    (i.to_string(), quote!(#index))
                }
            };

            quote! {
                #main_crate::private::FieldInfo {
                    name: #name,
                    type_name: ::std::any::type_name::<#field_ty>(),
                    offset: #main_crate::private::offset_of!(Self, #member),
                    size: ::std::mem::size_of::<#field_ty>(),
                },
            }
        })
        .collect();

    let mut infos = proc_macro2::TokenStream::new();
    infos.extend(field_infos);

    quote! {
        impl #impl_generics #main_crate::Component for #ident #ty_generics #where_clause {
            fn fields() -> #main_crate::private::SmallVec<[#main_crate::private::FieldInfo; #main_crate::private::MAX_FIELDS_ON_STACK]> {
                #main_crate::private::smallvec![#infos]
            }
        }
    }
    .into()
}
