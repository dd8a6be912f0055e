// SPDX-License-Identifier: MIT
//
// Request gateway: the pseudo-origin HTTP endpoint the embedded webview
// talks to.
//
// The webview believes it is loading an ordinary site at the configured
// pseudo-origin. Every request it issues is intercepted here and answered
// locally: static paths from the bundle's public directory, everything else
// by running the bundle's front controller through the execution queue. No
// socket is ever opened.

pub mod assets;
pub mod cookies;
pub mod gateway;
pub mod http;

pub use assets::{AssetBody, AssetStream, ServedAsset};
pub use cookies::{Cookie, CookieJar, CookieStore, JsonFileCookieStore};
pub use gateway::{Intercept, RequestGateway, StreamedAsset};
pub use http::parse_engine_response;
