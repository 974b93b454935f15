//! Event derive macro implementation, **parent-in-child** design.
//!
//! # Overview
//!
//! `#[derive(Event)]` generates:
//!
//! 1. `impl EventType`: the per-type descriptor, registered once through a
//!    `OnceLock` and the global identifier registry in `ultros-core`
//! 2. `impl Event`: cancellation delegated to the root, `upcast_ref` /
//!    `upcast_mut` walking the parent fields by `TypeId`
//! 3. `impl Deref[Mut]` when exactly one parent field exists
//!
//! # Root events
//!
//! A struct without `#[event(parent)]` fields is a root. It must carry the
//! cancellation flag itself, marked with `#[event(cancelled)]`.
//!
//! # Child events
//!
//! Every field marked `#[event(parent)]` is a parent. Parent order matters: it
//! is the base order used by C3 linearisation when identifiers are merged.
//!
//! | Level | Key | Description |
//! |-------|-----|-------------|
//! | struct | `identifier = "…"` | Explicit identifier (default `module::Type`) |
//! | field | `parent` | Field holds a parent event |
//! | field | `cancelled` | Root cancellation flag (`bool`) |

use proc_macro2::TokenStream;
use quote::quote;
use syn::{Attribute, Data, DeriveInput, Fields, Ident, LitStr, Type, spanned::Spanned};

// ============================================================================
// Attribute structures
// ============================================================================

#[derive(Default)]
struct StructAttrs {
    identifier: Option<LitStr>,
}

#[derive(Default)]
struct FieldAttrs {
    is_parent: bool,
    is_cancelled: bool,
}

struct ParentField {
    ident: Ident,
    ty: Type,
}

// ============================================================================
// Entry point
// ============================================================================

pub fn derive_event(input: &DeriveInput) -> syn::Result<TokenStream> {
    if !input.generics.params.is_empty() {
        return Err(syn::Error::new(
            input.generics.span(),
            "Event cannot be derived for generic types; each event type needs its own identifier",
        ));
    }

    let attrs = parse_struct_attrs(&input.attrs)?;
    let name = &input.ident;

    match &input.data {
        Data::Struct(data) => generate_struct_impl(name, &attrs, &data.fields),
        Data::Enum(_) => Err(syn::Error::new(
            input.span(),
            "Event does not support enums. Use structs with a parent field instead.",
        )),
        Data::Union(_) => Err(syn::Error::new(
            input.span(),
            "Event cannot be derived for unions",
        )),
    }
}

// ============================================================================
// Attribute parsing
// ============================================================================

fn parse_struct_attrs(attrs: &[Attribute]) -> syn::Result<StructAttrs> {
    let mut result = StructAttrs::default();

    for attr in attrs {
        if !attr.path().is_ident("event") {
            continue;
        }
        attr.parse_nested_meta(|meta| {
            if meta.path.is_ident("identifier") {
                let lit = meta.value()?.parse::<LitStr>()?;
                if lit.value().is_empty() {
                    return Err(meta.error("event identifier must not be empty"));
                }
                result.identifier = Some(lit);
                Ok(())
            } else {
                Err(meta.error("unknown event attribute, expected `identifier = \"...\"`"))
            }
        })?;
    }

    Ok(result)
}

fn parse_field_attrs(attrs: &[Attribute]) -> syn::Result<FieldAttrs> {
    let mut result = FieldAttrs::default();

    for attr in attrs {
        if !attr.path().is_ident("event") {
            continue;
        }
        attr.parse_nested_meta(|meta| {
            if meta.path.is_ident("parent") {
                result.is_parent = true;
            } else if meta.path.is_ident("cancelled") {
                result.is_cancelled = true;
            } else {
                return Err(meta.error("unknown field attribute, expected `parent` or `cancelled`"));
            }
            Ok(())
        })?;
    }

    Ok(result)
}

// ============================================================================
// Code generation
// ============================================================================

fn generate_struct_impl(
    name: &Ident,
    attrs: &StructAttrs,
    fields: &Fields,
) -> syn::Result<TokenStream> {
    let Fields::Named(named) = fields else {
        return Err(syn::Error::new(
            fields.span(),
            "Event can only be derived for structs with named fields",
        ));
    };

    let mut parents: Vec<ParentField> = Vec::new();
    let mut cancelled_field: Option<Ident> = None;

    for field in &named.named {
        let fa = parse_field_attrs(&field.attrs)?;
        let Some(ident) = field.ident.clone() else {
            continue;
        };
        if fa.is_parent && fa.is_cancelled {
            return Err(syn::Error::new(
                ident.span(),
                "a field cannot be both `parent` and `cancelled`",
            ));
        }
        if fa.is_parent {
            parents.push(ParentField {
                ident,
                ty: field.ty.clone(),
            });
        } else if fa.is_cancelled {
            if cancelled_field.is_some() {
                return Err(syn::Error::new(
                    ident.span(),
                    "only one field may be marked #[event(cancelled)]",
                ));
            }
            cancelled_field = Some(ident);
        }
    }

    let identifier = match &attrs.identifier {
        Some(lit) => quote! { #lit },
        None => quote! { ::std::concat!(::std::module_path!(), "::", ::std::stringify!(#name)) },
    };

    let descriptor_impl = generate_descriptor(name, &identifier, &parents);

    let event_impl = if parents.is_empty() {
        let cancelled = cancelled_field.ok_or_else(|| {
            syn::Error::new(
                name.span(),
                "a root event (no #[event(parent)] field) needs a `bool` field marked #[event(cancelled)]",
            )
        })?;
        generate_root_event(name, &cancelled)
    } else {
        if let Some(cancelled) = cancelled_field {
            return Err(syn::Error::new(
                cancelled.span(),
                "#[event(cancelled)] belongs on the root event; child events inherit it from their parent",
            ));
        }
        generate_child_event(name, &parents)
    };

    let deref_impls = match parents.as_slice() {
        [single] => generate_deref(name, single),
        _ => quote! {},
    };

    Ok(quote! {
        #descriptor_impl
        #event_impl
        #deref_impls
    })
}

/// `EventType` impl: one descriptor per type, registered on first use.
fn generate_descriptor(name: &Ident, identifier: &TokenStream, parents: &[ParentField]) -> TokenStream {
    let parent_tys = parents.iter().map(|p| &p.ty);

    quote! {
        impl ::ultros_core::event::EventType for #name {
            fn static_descriptor() -> &'static ::ultros_core::event::EventDescriptor {
                static DESCRIPTOR: ::std::sync::OnceLock<&'static ::ultros_core::event::EventDescriptor> =
                    ::std::sync::OnceLock::new();
                DESCRIPTOR.get_or_init(|| {
                    ::ultros_core::event::registry::register(
                        ::std::any::TypeId::of::<Self>(),
                        ::std::any::type_name::<Self>(),
                        #identifier,
                        &[#(<#parent_tys as ::ultros_core::event::EventType>::static_descriptor()),*],
                    )
                })
            }
        }
    }
}

fn generate_root_event(name: &Ident, cancelled: &Ident) -> TokenStream {
    quote! {
        impl ::ultros_core::event::Event for #name {
            fn descriptor(&self) -> &'static ::ultros_core::event::EventDescriptor {
                <Self as ::ultros_core::event::EventType>::static_descriptor()
            }

            fn is_cancelled(&self) -> bool {
                self.#cancelled
            }

            fn set_cancelled(&mut self, cancelled: bool) {
                self.#cancelled = cancelled;
            }

            fn as_any(&self) -> &dyn ::std::any::Any {
                self
            }

            fn as_any_mut(&mut self) -> &mut dyn ::std::any::Any {
                self
            }

            fn upcast_ref(&self, type_id: ::std::any::TypeId) -> Option<&dyn ::std::any::Any> {
                if type_id == ::std::any::TypeId::of::<Self>() {
                    Some(self as &dyn ::std::any::Any)
                } else {
                    None
                }
            }

            fn upcast_mut(&mut self, type_id: ::std::any::TypeId) -> Option<&mut dyn ::std::any::Any> {
                if type_id == ::std::any::TypeId::of::<Self>() {
                    Some(self as &mut dyn ::std::any::Any)
                } else {
                    None
                }
            }
        }
    }
}

fn generate_child_event(name: &Ident, parents: &[ParentField]) -> TokenStream {
    let first = &parents[0].ident;
    let all: Vec<&Ident> = parents.iter().map(|p| &p.ident).collect();

    // In a diamond every parent path carries its own copy of the root, so a
    // cancellation has to reach all of them.
    quote! {
        impl ::ultros_core::event::Event for #name {
            fn descriptor(&self) -> &'static ::ultros_core::event::EventDescriptor {
                <Self as ::ultros_core::event::EventType>::static_descriptor()
            }

            fn is_cancelled(&self) -> bool {
                ::ultros_core::event::Event::is_cancelled(&self.#first)
            }

            fn set_cancelled(&mut self, cancelled: bool) {
                #( ::ultros_core::event::Event::set_cancelled(&mut self.#all, cancelled); )*
            }

            fn as_any(&self) -> &dyn ::std::any::Any {
                self
            }

            fn as_any_mut(&mut self) -> &mut dyn ::std::any::Any {
                self
            }

            fn upcast_ref(&self, type_id: ::std::any::TypeId) -> Option<&dyn ::std::any::Any> {
                if type_id == ::std::any::TypeId::of::<Self>() {
                    return Some(self as &dyn ::std::any::Any);
                }
                #(
                    if let Some(found) = ::ultros_core::event::Event::upcast_ref(&self.#all, type_id) {
                        return Some(found);
                    }
                )*
                None
            }

            fn upcast_mut(&mut self, type_id: ::std::any::TypeId) -> Option<&mut dyn ::std::any::Any> {
                if type_id == ::std::any::TypeId::of::<Self>() {
                    return Some(self as &mut dyn ::std::any::Any);
                }
                #(
                    if let Some(found) = ::ultros_core::event::Event::upcast_mut(&mut self.#all, type_id) {
                        return Some(found);
                    }
                )*
                None
            }
        }
    }
}

fn generate_deref(name: &Ident, parent: &ParentField) -> TokenStream {
    let ident = &parent.ident;
    let ty = &parent.ty;

    quote! {
        impl ::std::ops::Deref for #name {
            type Target = #ty;
            #[inline]
            fn deref(&self) -> &Self::Target {
                &self.#ident
            }
        }

        impl ::std::ops::DerefMut for #name {
            #[inline]
            fn deref_mut(&mut self) -> &mut Self::Target {
                &mut self.#ident
            }
        }
    }
}
