mod read_model;

use proc_macro::TokenStream;

// ============================================================================
// #[derive(ReadModel)]
// ============================================================================

/// Derive macro for implementing the `ReadModel` trait.
///
/// # Usage
///
/// ```ignore
/// #[derive(Clone, Serialize, Deserialize, ReadModel)]
/// #[readmodel(collection = "book_listings")]
/// struct BookListing {
///     #[readmodel(id)]
///     pub book_id: BookId,
///     pub title: String,
/// }
/// ```
///
/// - `#[readmodel(collection = "...")]` sets the collection name.
///   If omitted, defaults to snake_case struct name + "s".
/// - `#[readmodel(id)]` marks the field used as the unique identifier; any
///   `Display` type works. If omitted, defaults to a field named `id`.
#[proc_macro_derive(ReadModel, attributes(readmodel))]
pub fn derive_read_model(input: TokenStream) -> TokenStream {
    read_model::derive_read_model(input)
}
