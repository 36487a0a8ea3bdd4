//! Shared macro for implementing `JsErrorClass` for error types

/// Implements `deno_error::JsErrorClass` so an op error becomes a plain
/// JavaScript `Error` whose message is the type's `Display` output.
#[macro_export]
macro_rules! impl_js_error_class {
    ($error_type:ty) => {
        impl deno_error::JsErrorClass for $error_type {
            fn get_class(&self) -> std::borrow::Cow<'static, str> {
                std::borrow::Cow::Borrowed("Error")
            }

            fn get_message(&self) -> std::borrow::Cow<'static, str> {
                std::borrow::Cow::Owned(self.to_string())
            }

            fn get_additional_properties(
                &self,
            ) -> Box<dyn Iterator<Item = (std::borrow::Cow<'static, str>, deno_error::PropertyValue)>>
            {
                Box::new(std::iter::empty())
            }

            fn get_ref(&self) -> &(dyn std::error::Error + Send + Sync + 'static) {
                self
            }
        }
    };
}
