// SPDX-License-Identifier: MIT
//
// iOS platform shell via objc2.
//
// Requires compilation with the iOS SDK (Xcode). Browser launches go through
// UIApplication; the secure store wraps the Security.framework keychain.
//
// This module is cfg-gated to `target_os = "ios"` and will not compile on
// other platforms. UIApplication must be touched from the main thread;
// `open_external` returns `SkiffError::Bridge` if called off-main.

#![cfg(target_os = "ios")]

use std::ffi::c_void;

use objc2::rc::Retained;
use objc2::runtime::AnyObject;
use objc2::{msg_send, MainThreadMarker};
use objc2_foundation::{NSData, NSDictionary, NSString, NSURL};
use objc2_ui_kit::UIApplication;

use skiff_core::error::{Result, SkiffError};

use crate::traits::*;

// ---------------------------------------------------------------------------
// Security.framework FFI (keychain)
// ---------------------------------------------------------------------------
// Security.framework is a C API not wrapped by objc2. NSDictionary and
// CFDictionary are toll-free bridged, so we cast freely between them.

const ERR_SEC_SUCCESS: i32 = 0;
const ERR_SEC_ITEM_NOT_FOUND: i32 = -25300;
const ERR_SEC_DUPLICATE_ITEM: i32 = -25299;

extern "C" {
    fn SecItemAdd(attributes: *const c_void, result: *mut *const c_void) -> i32;
    fn SecItemCopyMatching(query: *const c_void, result: *mut *const c_void) -> i32;
    fn SecItemUpdate(query: *const c_void, attrs_to_update: *const c_void) -> i32;
    fn SecItemDelete(query: *const c_void) -> i32;
}

// CFStringRef globals, toll-free bridged with `NSString *`. Linked
// automatically when building against the iOS SDK.
extern "C" {
    static kSecClass: &'static NSString;
    static kSecClassGenericPassword: &'static NSString;
    static kSecAttrAccount: &'static NSString;
    static kSecAttrService: &'static NSString;
    static kSecValueData: &'static NSString;
    static kSecReturnData: &'static NSString;
    static kSecMatchLimit: &'static NSString;
    static kSecMatchLimitOne: &'static NSString;
}

/// The keychain service identifier for all Skiff secrets.
const KEYCHAIN_SERVICE: &str = "dev.skiff.app";

fn sec_err(op: &str, status: i32) -> SkiffError {
    SkiffError::Bridge(format!("keychain {op} failed with OSStatus {status}"))
}

/// Build the base `{class, service, account}` query dictionary.
fn base_query(key: &str) -> Retained<NSDictionary<NSString, AnyObject>> {
    let service = NSString::from_str(KEYCHAIN_SERVICE);
    let account = NSString::from_str(key);
    // SAFETY: the kSec* statics are valid NSString globals for the process
    // lifetime; casting to AnyObject references only widens the type.
    unsafe {
        NSDictionary::from_slices(
            &[kSecClass, kSecAttrService, kSecAttrAccount],
            &[
                &*(kSecClassGenericPassword as *const NSString as *const AnyObject),
                &*(Retained::as_ptr(&service) as *const AnyObject),
                &*(Retained::as_ptr(&account) as *const AnyObject),
            ],
        )
    }
}

// ---------------------------------------------------------------------------
// Shell struct
// ---------------------------------------------------------------------------

/// iOS implementation of the platform shell. Zero-sized; all state lives in
/// UIKit and the keychain.
pub struct IosShell;

impl IosShell {
    pub fn new() -> Self {
        Self
    }
}

impl PlatformShell for IosShell {
    fn platform_name(&self) -> &str {
        "iOS"
    }
}

impl NativeBrowser for IosShell {
    fn open_external(&self, url: &str) -> Result<()> {
        let mtm = MainThreadMarker::new()
            .ok_or_else(|| SkiffError::Bridge("open_external called off the main thread".into()))?;

        let ns_url = unsafe { NSURL::URLWithString(&NSString::from_str(url)) }
            .ok_or_else(|| SkiffError::Bridge(format!("URL rejected by NSURL: {url}")))?;

        tracing::info!(%url, "iOS: opening external URL");
        let app = UIApplication::sharedApplication(mtm);
        // openURL:options:completionHandler: with nil handler; UIKit reports
        // failures through the handler we do not pass, so dispatch is
        // best-effort by contract.
        unsafe {
            let _: () = msg_send![
                &app,
                openURL: &*ns_url,
                options: &*NSDictionary::<NSString, AnyObject>::new(),
                completionHandler: std::ptr::null::<c_void>()
            ];
        }
        Ok(())
    }
}

impl NativeSecureStore for IosShell {
    fn store(&self, key: &str, value: &str) -> Result<()> {
        let data = NSData::with_bytes(value.as_bytes());

        let query = base_query(key);
        let attrs = unsafe {
            NSDictionary::from_slices(
                &[kSecValueData],
                &[&*(Retained::as_ptr(&data) as *const AnyObject)],
            )
        };

        // Try update-in-place first, add on not-found.
        let status = unsafe {
            SecItemUpdate(
                Retained::as_ptr(&query) as *const c_void,
                Retained::as_ptr(&attrs) as *const c_void,
            )
        };
        match status {
            ERR_SEC_SUCCESS => Ok(()),
            ERR_SEC_ITEM_NOT_FOUND => {
                let add_query = base_query(key);
                let add_status = unsafe {
                    // Merged dict: query attributes plus the value.
                    let merged = NSDictionary::from_slices(
                        &[kSecClass, kSecAttrService, kSecAttrAccount, kSecValueData],
                        &[
                            &*(kSecClassGenericPassword as *const NSString as *const AnyObject),
                            &*(Retained::as_ptr(&NSString::from_str(KEYCHAIN_SERVICE))
                                as *const AnyObject),
                            &*(Retained::as_ptr(&NSString::from_str(key)) as *const AnyObject),
                            &*(Retained::as_ptr(&data) as *const AnyObject),
                        ],
                    );
                    drop(add_query);
                    SecItemAdd(Retained::as_ptr(&merged) as *const c_void, std::ptr::null_mut())
                };
                match add_status {
                    ERR_SEC_SUCCESS | ERR_SEC_DUPLICATE_ITEM => Ok(()),
                    status => Err(sec_err("add", status)),
                }
            }
            status => Err(sec_err("update", status)),
        }
    }

    fn load(&self, key: &str) -> Result<Option<String>> {
        let query = unsafe {
            NSDictionary::from_slices(
                &[
                    kSecClass,
                    kSecAttrService,
                    kSecAttrAccount,
                    kSecReturnData,
                    kSecMatchLimit,
                ],
                &[
                    &*(kSecClassGenericPassword as *const NSString as *const AnyObject),
                    &*(Retained::as_ptr(&NSString::from_str(KEYCHAIN_SERVICE)) as *const AnyObject),
                    &*(Retained::as_ptr(&NSString::from_str(key)) as *const AnyObject),
                    &*(Retained::as_ptr(&NSString::from_str("1")) as *const AnyObject),
                    &*(kSecMatchLimitOne as *const NSString as *const AnyObject),
                ],
            )
        };

        let mut result: *const c_void = std::ptr::null();
        let status =
            unsafe { SecItemCopyMatching(Retained::as_ptr(&query) as *const c_void, &mut result) };
        match status {
            ERR_SEC_SUCCESS => {
                if result.is_null() {
                    return Ok(None);
                }
                // SAFETY: with kSecReturnData the result is a CFDataRef,
                // toll-free bridged to NSData, retained for us by the API.
                let data = unsafe { Retained::<NSData>::from_raw(result as *mut NSData) }
                    .ok_or_else(|| SkiffError::Bridge("keychain returned null data".into()))?;
                let bytes = data.to_vec();
                let text = String::from_utf8(bytes)
                    .map_err(|_| SkiffError::Bridge("keychain value is not UTF-8".into()))?;
                Ok(Some(text))
            }
            ERR_SEC_ITEM_NOT_FOUND => Ok(None),
            status => Err(sec_err("copy", status)),
        }
    }

    fn delete(&self, key: &str) -> Result<()> {
        let query = base_query(key);
        let status = unsafe { SecItemDelete(Retained::as_ptr(&query) as *const c_void) };
        match status {
            ERR_SEC_SUCCESS | ERR_SEC_ITEM_NOT_FOUND => Ok(()),
            status => Err(sec_err("delete", status)),
        }
    }
}
