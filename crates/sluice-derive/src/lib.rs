//! Procedural macros for sluice service definitions.
//!
//! # Example
//!
//! ```ignore
//! #[sluice::service]
//! pub trait Calc {
//!     async fn add(&self, a: i32, b: i32) -> anyhow::Result<i32>;
//!     async fn reset(&self) -> anyhow::Result<()>;
//!     fn version(&self) -> anyhow::Result<String>;
//! }
//!
//! // Generated:
//! // - the trait, made async-trait compatible and `Send + Sync + 'static`
//! // - `CalcProxy`: implements `Calc` by forwarding to a `sluice::Invoker`
//! // - `CalcTarget<T>`: serves any `T: Calc` as a `sluice::Target`
//! ```

use proc_macro::TokenStream;
use proc_macro2::TokenStream as TokenStream2;
use quote::format_ident;
use quote::quote;
use syn::ItemTrait;
use syn::parse_quote;

mod parser;

use parser::ServiceMethod;
use parser::ServiceTrait;

/// Marks a trait as a sluice RPC service.
///
/// Every method must take `&self` and return `Result<T, E>` with
/// `E: From<sluice::Error>` (`anyhow::Result` works). `async fn` methods are
/// forwarded asynchronously; plain `fn` methods need a blocking invoker.
///
/// Parameter types enter each method's wire signature exactly as spelled in
/// the trait, so `String` and `std::string::String` give different
/// signatures. Client and server must be built from the same trait
/// definition.
#[proc_macro_attribute]
pub fn service(_attr: TokenStream, item: TokenStream) -> TokenStream {
    let item = syn::parse_macro_input!(item as ItemTrait);
    match parser::parse(item) {
        Ok(service) => generate(service).into(),
        Err(e) => e.to_compile_error().into(),
    }
}

fn generate(service: ServiceTrait) -> TokenStream2 {
    let ServiceTrait { mut item, methods } = service;

    item.supertraits.push(parse_quote!(::core::marker::Send));
    item.supertraits.push(parse_quote!(::core::marker::Sync));
    item.supertraits.push(parse_quote!('static));
    if item.colon_token.is_none() {
        item.colon_token = Some(Default::default());
    }

    let vis = &item.vis;
    let name = &item.ident;
    let name_str = name.to_string();
    let proxy = format_ident!("{}Proxy", name);
    let target = format_ident!("{}Target", name);

    let descriptors = methods.iter().enumerate().map(|(index, m)| descriptor(&name_str, index, m));
    let proxy_methods = methods.iter().enumerate().map(|(index, m)| proxy_method(index, m));
    let dispatch_arms = methods.iter().enumerate().map(|(index, m)| dispatch_arm(index, m));

    let proxy_doc = format!("Client proxy for [`{}`]. Every call goes through a `sluice::Invoker`.", name_str);
    let target_doc = format!("Serves an implementation of [`{}`] as a `sluice::Target`.", name_str);

    quote! {
        #[::sluice::async_trait]
        #item

        #[doc = #proxy_doc]
        #[derive(Clone)]
        #vis struct #proxy {
            invoker: ::std::sync::Arc<dyn ::sluice::Invoker>,
        }

        impl #proxy {
            pub const METHODS: &'static [::sluice::MethodDescriptor] = &[#(#descriptors),*];
        }

        impl ::sluice::ServiceProxy for #proxy {
            const NAME: &'static str = #name_str;

            fn methods() -> &'static [::sluice::MethodDescriptor] {
                Self::METHODS
            }

            fn from_invoker(invoker: ::std::sync::Arc<dyn ::sluice::Invoker>) -> Self {
                Self { invoker }
            }
        }

        #[::sluice::async_trait]
        impl #name for #proxy {
            #(#proxy_methods)*
        }

        #[doc = #target_doc]
        #vis struct #target<T: ?Sized> {
            inner: ::std::sync::Arc<T>,
            hook: ::core::option::Option<::std::sync::Arc<dyn ::sluice::ContextAware>>,
        }

        impl<T: #name + ?Sized> #target<T> {
            pub fn new(inner: ::std::sync::Arc<T>) -> Self {
                Self { inner, hook: ::core::option::Option::None }
            }

            pub fn inner(&self) -> &::std::sync::Arc<T> {
                &self.inner
            }
        }

        impl<T: #name + ::sluice::ContextAware + 'static> #target<T> {
            /// Serves `inner` and lets it gate every call through its context hook.
            pub fn context_aware(inner: ::std::sync::Arc<T>) -> Self {
                let hook: ::std::sync::Arc<dyn ::sluice::ContextAware> = inner.clone();
                Self { inner, hook: ::core::option::Option::Some(hook) }
            }
        }

        #[::sluice::async_trait]
        impl<T: #name + ?Sized + 'static> ::sluice::Target for #target<T> {
            fn service_name(&self) -> &'static str {
                #name_str
            }

            fn methods(&self) -> &'static [::sluice::MethodDescriptor] {
                #proxy::METHODS
            }

            #[allow(unused_mut, unused_variables)]
            async fn invoke(
                &self,
                method: &'static ::sluice::MethodDescriptor,
                args: ::std::vec::Vec<::sluice::Value>,
            ) -> ::sluice::anyhow::Result<::sluice::Value> {
                let not_found = || ::sluice::Error::MethodNotFound {
                    service: #name_str.to_string(),
                    signature: method.signature().to_string(),
                };
                if method.service != #name_str {
                    return ::core::result::Result::Err(not_found().into());
                }
                let mut __args = args.into_iter();
                match method.index {
                    #(#dispatch_arms)*
                    _ => ::core::result::Result::Err(not_found().into()),
                }
            }

            fn context_hook(&self) -> ::core::option::Option<&dyn ::sluice::ContextAware> {
                self.hook.as_deref()
            }
        }
    }
}

fn descriptor(service: &str, index: usize, m: &ServiceMethod) -> TokenStream2 {
    let name = m.name.to_string();
    let params = m.params.iter().map(|p| p.type_name());
    let returns = if m.unit {
        quote! { ::sluice::ReturnShape::Unit }
    } else {
        let ok = parser::type_name(&m.ok);
        quote! { ::sluice::ReturnShape::Value(#ok) }
    };
    let blocking = m.blocking;

    quote! {
        ::sluice::MethodDescriptor {
            service: #service,
            name: #name,
            index: #index,
            params: &[#(#params),*],
            returns: #returns,
            blocking: #blocking,
        }
    }
}

fn proxy_method(index: usize, m: &ServiceMethod) -> TokenStream2 {
    let sig = &m.sig;
    let ok = &m.ok;
    let names = m.params.iter().map(|p| &p.name);

    let call = if m.blocking {
        quote! { self.invoker.invoke_blocking(&Self::METHODS[#index], __args)? }
    } else {
        quote! { self.invoker.invoke(&Self::METHODS[#index], __args).await? }
    };

    let finish = if m.unit {
        quote! {
            let _ = __value;
            ::core::result::Result::Ok(())
        }
    } else {
        quote! { ::core::result::Result::Ok(::sluice::from_value::<#ok>(__value)?) }
    };

    quote! {
        #sig {
            let __args: ::std::vec::Vec<::sluice::Value> = ::std::vec![#(::sluice::to_value(&#names)?),*];
            let __value = #call;
            #finish
        }
    }
}

fn dispatch_arm(index: usize, m: &ServiceMethod) -> TokenStream2 {
    let method = &m.name;
    let locals: Vec<_> = m.params.iter().map(|p| format_ident!("__{}", p.name)).collect();
    let decode = m.params.iter().zip(&locals).enumerate().map(|(position, (p, local))| {
        let ty = &p.ty;
        quote! { let #local: #ty = ::sluice::arg(&mut __args, method, #position)?; }
    });
    let wait = if m.blocking { quote! {} } else { quote! { .await } };

    quote! {
        #index => {
            #(#decode)*
            let __ret = self.inner.#method(#(#locals),*)#wait
                .map_err(::core::convert::Into::<::sluice::anyhow::Error>::into)?;
            ::core::result::Result::Ok(::sluice::to_value(&__ret)?)
        }
    }
}
