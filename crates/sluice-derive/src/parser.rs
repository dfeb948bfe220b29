//! Service trait parsing and validation.

use proc_macro2::Span;
use quote::ToTokens;
use syn::FnArg;
use syn::GenericArgument;
use syn::Ident;
use syn::ItemTrait;
use syn::Pat;
use syn::PathArguments;
use syn::ReturnType;
use syn::TraitItem;
use syn::Type;
use syn::spanned::Spanned;

pub struct ServiceTrait {
    pub item: ItemTrait,
    pub methods: Vec<ServiceMethod>,
}

pub struct ServiceMethod {
    pub name: Ident,
    pub sig: syn::Signature,
    pub params: Vec<Param>,
    /// The `T` in `Result<T, E>`.
    pub ok: Type,
    pub unit: bool,
    pub blocking: bool,
}

pub struct Param {
    pub name: Ident,
    pub ty: Type,
}

impl Param {
    /// Parameter type as written, whitespace removed.
    pub fn type_name(&self) -> String {
        type_name(&self.ty)
    }
}

pub fn type_name(ty: &Type) -> String {
    ty.to_token_stream().to_string().replace(' ', "")
}

pub fn parse(item: ItemTrait) -> syn::Result<ServiceTrait> {
    if !item.generics.params.is_empty() || item.generics.where_clause.is_some() {
        return Err(syn::Error::new(item.generics.span(), "service traits cannot be generic"));
    }

    let mut methods = Vec::new();
    for entry in &item.items {
        let TraitItem::Fn(method) = entry else {
            return Err(syn::Error::new(entry.span(), "service traits may only contain methods"));
        };
        if let Some(body) = &method.default {
            return Err(syn::Error::new(body.span(), "service methods cannot have default bodies"));
        }
        methods.push(parse_method(&method.sig)?);
    }

    Ok(ServiceTrait { item, methods })
}

fn parse_method(sig: &syn::Signature) -> syn::Result<ServiceMethod> {
    if !sig.generics.params.is_empty() {
        return Err(syn::Error::new(sig.generics.span(), "service methods cannot be generic"));
    }

    let mut inputs = sig.inputs.iter();
    match inputs.next() {
        Some(FnArg::Receiver(receiver)) if receiver.reference.is_some() && receiver.mutability.is_none() => {}
        _ => return Err(syn::Error::new(sig.span(), "service methods must take `&self`")),
    }

    let mut params = Vec::new();
    for input in inputs {
        let FnArg::Typed(typed) = input else {
            return Err(syn::Error::new(input.span(), "unexpected receiver"));
        };
        let Pat::Ident(ident) = &*typed.pat else {
            return Err(syn::Error::new(typed.pat.span(), "service parameters must be plain identifiers"));
        };
        params.push(Param {
            name: ident.ident.clone(),
            ty: (*typed.ty).clone(),
        });
    }

    let ok = result_ok_type(&sig.output)?;
    let unit = matches!(&ok, Type::Tuple(tuple) if tuple.elems.is_empty());

    Ok(ServiceMethod {
        name: sig.ident.clone(),
        sig: sig.clone(),
        params,
        ok,
        unit,
        blocking: sig.asyncness.is_none(),
    })
}

/// Extracts `T` from a `Result<T>` or `Result<T, E>` return type.
fn result_ok_type(output: &ReturnType) -> syn::Result<Type> {
    let ReturnType::Type(_, ty) = output else {
        return Err(syn::Error::new(Span::call_site(), "service methods must return a `Result`"));
    };
    let Type::Path(path) = &**ty else {
        return Err(syn::Error::new(ty.span(), "service methods must return a `Result`"));
    };
    let Some(last) = path.path.segments.last() else {
        return Err(syn::Error::new(ty.span(), "service methods must return a `Result`"));
    };
    if last.ident != "Result" {
        return Err(syn::Error::new(last.ident.span(), "service methods must return a `Result`"));
    }
    let PathArguments::AngleBracketed(args) = &last.arguments else {
        return Err(syn::Error::new(last.span(), "`Result` needs a success type"));
    };
    match args.args.first() {
        Some(GenericArgument::Type(ok)) => Ok(ok.clone()),
        _ => Err(syn::Error::new(args.span(), "`Result` needs a success type")),
    }
}
