// SPDX-License-Identifier: MIT
//
// Android platform shell via JNI.
//
// Requires the Android NDK and targets `aarch64-linux-android` or
// `armv7-linux-androideabi`. Browser launches dispatch an ACTION_VIEW intent;
// the secure store is backed by a private SharedPreferences file.

#![cfg(target_os = "android")]

use jni::objects::{JObject, JString, JValue};
use jni::JNIEnv;

use skiff_core::error::{Result, SkiffError};

use crate::traits::*;

/// SharedPreferences file name for bridge secrets.
const PREFS_FILE: &str = "skiff_secure_store";

/// Context.MODE_PRIVATE.
const MODE_PRIVATE: i32 = 0;

/// Obtain a [`JNIEnv`] handle from the global Android context.
///
/// Retrieves the `JavaVM*` pointer set by the NDK glue code and attaches the
/// current thread if it is not already attached.
fn jni_env() -> Result<JNIEnv<'static>> {
    let ctx = ndk_context::android_context();
    // SAFETY: `ctx.vm()` returns the `JavaVM*` set by the NDK glue code. The
    // pointer is valid for the lifetime of the process.
    let vm = unsafe { jni::JavaVM::from_raw(ctx.vm().cast()) }
        .map_err(|e| SkiffError::Bridge(format!("failed to obtain JavaVM: {e}")))?;
    vm.attach_current_thread()
        .map_err(|e| SkiffError::Bridge(format!("failed to attach JNI thread: {e}")))
}

/// Obtain the hosting `Activity` as a [`JObject`].
fn activity() -> Result<JObject<'static>> {
    let ctx = ndk_context::android_context();
    let ptr = ctx.context();
    if ptr.is_null() {
        return Err(SkiffError::Bridge(
            "Android context is null, native activity not initialised".into(),
        ));
    }
    // SAFETY: the NDK guarantees this pointer is a valid global jobject for
    // the hosting Activity.
    Ok(unsafe { JObject::from_raw(ptr.cast()) })
}

fn jni_err(context: &str, e: jni::errors::Error) -> SkiffError {
    SkiffError::Bridge(format!("{context}: {e}"))
}

/// `context.getSharedPreferences(PREFS_FILE, MODE_PRIVATE)`.
fn shared_prefs<'a>(env: &mut JNIEnv<'a>, activity: &JObject<'a>) -> Result<JObject<'a>> {
    let name: JString = env
        .new_string(PREFS_FILE)
        .map_err(|e| jni_err("new_string(prefs)", e))?;
    env.call_method(
        activity,
        "getSharedPreferences",
        "(Ljava/lang/String;I)Landroid/content/SharedPreferences;",
        &[JValue::Object(&name), JValue::Int(MODE_PRIVATE)],
    )
    .map_err(|e| jni_err("getSharedPreferences", e))?
    .l()
    .map_err(|e| jni_err("getSharedPreferences->l", e))
}

/// Android implementation of the platform shell.
///
/// Zero-sized; all state lives on the Java side. The first JNI call happens
/// lazily when a trait method is invoked.
pub struct AndroidShell;

impl AndroidShell {
    pub fn new() -> Self {
        Self
    }
}

impl PlatformShell for AndroidShell {
    fn platform_name(&self) -> &str {
        "Android"
    }
}

impl NativeBrowser for AndroidShell {
    /// Launch `Intent(ACTION_VIEW, Uri.parse(url))` on the hosting Activity.
    fn open_external(&self, url: &str) -> Result<()> {
        let mut env = jni_env()?;
        let activity = activity()?;

        tracing::info!(%url, "Android: dispatching ACTION_VIEW intent");

        let j_url: JString = env.new_string(url).map_err(|e| jni_err("new_string(url)", e))?;
        let uri: JObject = env
            .call_static_method(
                "android/net/Uri",
                "parse",
                "(Ljava/lang/String;)Landroid/net/Uri;",
                &[JValue::Object(&j_url)],
            )
            .map_err(|e| jni_err("Uri.parse", e))?
            .l()
            .map_err(|e| jni_err("Uri.parse->l", e))?;

        let action: JString = env
            .new_string("android.intent.action.VIEW")
            .map_err(|e| jni_err("new_string(action)", e))?;
        let intent: JObject = env
            .new_object(
                "android/content/Intent",
                "(Ljava/lang/String;Landroid/net/Uri;)V",
                &[JValue::Object(&action), JValue::Object(&uri)],
            )
            .map_err(|e| jni_err("new Intent", e))?;

        env.call_method(
            &activity,
            "startActivity",
            "(Landroid/content/Intent;)V",
            &[JValue::Object(&intent)],
        )
        .map_err(|e| jni_err("startActivity", e))?;
        Ok(())
    }
}

impl NativeSecureStore for AndroidShell {
    fn store(&self, key: &str, value: &str) -> Result<()> {
        let mut env = jni_env()?;
        let activity = activity()?;
        let prefs = shared_prefs(&mut env, &activity)?;

        let editor: JObject = env
            .call_method(
                &prefs,
                "edit",
                "()Landroid/content/SharedPreferences$Editor;",
                &[],
            )
            .map_err(|e| jni_err("prefs.edit", e))?
            .l()
            .map_err(|e| jni_err("prefs.edit->l", e))?;

        let j_key: JString = env.new_string(key).map_err(|e| jni_err("new_string(key)", e))?;
        let j_value: JString = env
            .new_string(value)
            .map_err(|e| jni_err("new_string(value)", e))?;
        let editor: JObject = env
            .call_method(
                &editor,
                "putString",
                "(Ljava/lang/String;Ljava/lang/String;)Landroid/content/SharedPreferences$Editor;",
                &[JValue::Object(&j_key), JValue::Object(&j_value)],
            )
            .map_err(|e| jni_err("putString", e))?
            .l()
            .map_err(|e| jni_err("putString->l", e))?;

        env.call_method(&editor, "apply", "()V", &[])
            .map_err(|e| jni_err("editor.apply", e))?;
        Ok(())
    }

    fn load(&self, key: &str) -> Result<Option<String>> {
        let mut env = jni_env()?;
        let activity = activity()?;
        let prefs = shared_prefs(&mut env, &activity)?;

        let j_key: JString = env.new_string(key).map_err(|e| jni_err("new_string(key)", e))?;
        let null = JObject::null();
        let value: JObject = env
            .call_method(
                &prefs,
                "getString",
                "(Ljava/lang/String;Ljava/lang/String;)Ljava/lang/String;",
                &[JValue::Object(&j_key), JValue::Object(&null)],
            )
            .map_err(|e| jni_err("getString", e))?
            .l()
            .map_err(|e| jni_err("getString->l", e))?;

        if value.is_null() {
            return Ok(None);
        }
        let text: String = env
            .get_string(&JString::from(value))
            .map_err(|e| jni_err("get_string", e))?
            .into();
        Ok(Some(text))
    }

    fn delete(&self, key: &str) -> Result<()> {
        let mut env = jni_env()?;
        let activity = activity()?;
        let prefs = shared_prefs(&mut env, &activity)?;

        let editor: JObject = env
            .call_method(
                &prefs,
                "edit",
                "()Landroid/content/SharedPreferences$Editor;",
                &[],
            )
            .map_err(|e| jni_err("prefs.edit", e))?
            .l()
            .map_err(|e| jni_err("prefs.edit->l", e))?;

        let j_key: JString = env.new_string(key).map_err(|e| jni_err("new_string(key)", e))?;
        let editor: JObject = env
            .call_method(
                &editor,
                "remove",
                "(Ljava/lang/String;)Landroid/content/SharedPreferences$Editor;",
                &[JValue::Object(&j_key)],
            )
            .map_err(|e| jni_err("remove", e))?
            .l()
            .map_err(|e| jni_err("remove->l", e))?;

        env.call_method(&editor, "apply", "()V", &[])
            .map_err(|e| jni_err("editor.apply", e))?;
        Ok(())
    }
}
