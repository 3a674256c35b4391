//! System dialogs that can cover any app. Highest priorities in the registry.

use crate::signature::{ScreenSignature, SignatureError, SYSTEM_APP_ID};

pub fn signatures() -> Result<Vec<ScreenSignature>, SignatureError> {
    let app = SYSTEM_APP_ID;
    Ok(vec![
        // ----- permissions -----
        ScreenSignature::builder(app, "permission_dialog")
            .describe("Android permission request dialog (Allow/Deny)")
            .required(&["text:Allow", "text:Deny"])
            .unique(&[":id/permission_message"])
            .optional(&[
                "text:Don't allow",
                "text:While using the app",
                "text:Only this time",
                ":id/permission_icon",
                "contains:access to",
            ])
            .priority(100)
            .recovery("click_deny")
            .build()?,
        ScreenSignature::builder(app, "permission_dialog_v2")
            .describe("Android 13+ permission dialog with radio buttons")
            .required(&["text:Allow"])
            .unique(&["text:While using the app", "text:Only this time"])
            .optional(&["text:Don't allow", ":id/permission_allow_button", ":id/permission_deny_button"])
            .priority(100)
            .recovery("click_deny")
            .build()?,
        // ----- crashes -----
        ScreenSignature::builder(app, "app_crash_dialog")
            .describe("App has stopped/crashed dialog")
            .required(&["contains:has stopped"])
            .unique(&["contains:has stopped"])
            .optional(&["text:Close app", "text:Open app again", "text:Send feedback", "text:App info"])
            .priority(100)
            .recovery("click_close_app")
            .build()?,
        ScreenSignature::builder(app, "app_not_responding")
            .describe("App not responding (ANR) dialog")
            .required(&["contains:isn't responding"])
            .unique(&["contains:isn't responding"])
            .optional(&["text:Close app", "text:Wait", "text:Send feedback"])
            .priority(100)
            .recovery("click_wait")
            .build()?,
        // ----- settings prompts -----
        ScreenSignature::builder(app, "battery_optimization")
            .describe("Battery optimization dialog")
            .required(&["contains:battery optimization"])
            .unique(&["contains:battery optimization"])
            .optional(&["text:Allow", "text:Deny", "text:Don't optimize"])
            .priority(100)
            .recovery("click_deny")
            .build()?,
        ScreenSignature::builder(app, "system_alert_window")
            .describe("Display over other apps permission")
            .required(&["contains:display over other apps"])
            .unique(&["contains:display over other apps"])
            .optional(&["text:Allow", "text:Deny"])
            .priority(100)
            .recovery("click_deny")
            .build()?,
        ScreenSignature::builder(app, "accessibility_service")
            .describe("Accessibility service confirmation")
            .required(&["contains:Accessibility"])
            .unique(&["contains:full control of your device"])
            .optional(&["text:Allow", "text:Deny", "text:Use service"])
            .priority(100)
            .recovery("click_allow")
            .build()?,
        // ----- connectivity -----
        ScreenSignature::builder(app, "no_internet_dialog")
            .describe("No internet connection dialog")
            .required(&["contains:No internet"])
            .unique(&["contains:No internet"])
            .optional(&["text:OK", "text:Retry", "text:Settings"])
            .priority(95)
            .recovery("click_ok")
            .build()?,
        ScreenSignature::builder(app, "wifi_connection_prompt")
            .describe("WiFi connection prompt")
            .required(&["contains:Wi-Fi"])
            .optional(&["text:Connect", "text:Cancel", ":id/alertTitle"])
            .priority(90)
            .recovery("click_cancel")
            .build()?,
        ScreenSignature::builder(app, "low_storage_warning")
            .describe("Low storage space warning")
            .required(&["contains:Storage space"])
            .unique(&["contains:running low"])
            .optional(&["text:OK", "text:Manage storage"])
            .priority(95)
            .recovery("click_ok")
            .build()?,
        // ----- updates -----
        ScreenSignature::builder(app, "app_update_available")
            .describe("App update available dialog (modal)")
            .required(&[":id/alertTitle OR :id/message OR :id/button1 OR :id/button2"])
            .unique(&["text:Update OR text:Update now"])
            .optional(&["text:Not now", "text:Later", "contains:new version", "contains:update available"])
            .priority(90)
            .recovery("click_not_now")
            .build()?,
        ScreenSignature::builder(app, "google_play_services_update")
            .describe("Google Play Services update required")
            .required(&["contains:Google Play services"])
            .unique(&["contains:Google Play services"])
            .optional(&["text:Update", "text:Cancel"])
            .priority(95)
            .recovery("click_cancel")
            .build()?,
    ])
}
