//! Instagram screens.
//!
//! Priorities: overlays 90-100, login/onboarding 80-89, navigation and
//! content screens 25-55. Resource ids use the `:id/` form so that repackaged
//! clones of the app still match.

use crate::signature::{ScreenSignature, SignatureError};

pub const APP_ID: &str = "instagram";

pub fn signatures() -> Result<Vec<ScreenSignature>, SignatureError> {
    let mut out = overlays()?;
    out.extend(login_flow()?);
    out.extend(onboarding()?);
    out.extend(navigation()?);
    out.extend(content()?);
    Ok(out)
}

fn overlays() -> Result<Vec<ScreenSignature>, SignatureError> {
    Ok(vec![
        ScreenSignature::builder(APP_ID, "peek_view")
            .describe("Long-press preview overlay showing reel/post with action buttons")
            .required(&[":id/peek_container"])
            .forbidden(&[":id/layout_comment_thread_edittext", "text:Views & likes"])
            .unique(&[":id/peek_container"])
            .optional(&[
                ":id/peek_view_group_buttons",
                ":id/row_feed_button_like",
                ":id/row_feed_button_share",
                "content-desc:View Profile",
                "content-desc:Like",
            ])
            .priority(100)
            .recovery("back")
            .build()?,
        ScreenSignature::builder(APP_ID, "comments_view")
            .describe("Bottom sheet comments overlay on reel/post")
            .required(&[":id/layout_comment_thread_edittext", ":id/bottom_sheet_container"])
            .forbidden(&["text:Views & likes"])
            .unique(&[":id/layout_comment_thread_edittext"])
            .optional(&[
                "text:Comments",
                ":id/comment_composer_parent",
                ":id/main_list_view",
                "content-desc:Tap to like comment",
            ])
            .priority(95)
            .recovery("back")
            .build()?,
        ScreenSignature::builder(APP_ID, "likes_page")
            .describe("Views & likes overlay showing users who liked content")
            .required(&[":id/bottom_sheet_container", "text:Likes"])
            .forbidden(&[":id/layout_comment_thread_edittext", ":id/peek_container"])
            .optional(&[":id/row_user_container_base", ":id/row_follow_button", "content-desc:Likes"])
            .priority(98)
            .recovery("back")
            .build()?,
        ScreenSignature::builder(APP_ID, "account_suspended")
            .describe("Account suspended/disabled, terminal state")
            .required(&["contains:days left to appeal"])
            .forbidden(&[":id/login_username", "text:Your story", "text:Get started"])
            .unique(&["contains:days left to appeal"])
            .optional(&["text:Appeal", "contains:suspended your account", "text:Why this happened"])
            .priority(95)
            .recovery("handle_account_suspended")
            .build()?,
    ])
}

fn login_flow() -> Result<Vec<ScreenSignature>, SignatureError> {
    Ok(vec![
        ScreenSignature::builder(APP_ID, "join_instagram")
            .describe("Welcome screen with Get started / I already have an account")
            .required(&["text:Get started", "text:I already have an account"])
            .forbidden(&[":id/login_username", "text:Meta Terms and Privacy Policy", "text:Your story"])
            .unique(&["text:I already have an account"])
            .optional(&["text:English (US)"])
            .priority(85)
            .recovery("click_already_have_account")
            .build()?,
        ScreenSignature::builder(APP_ID, "login_meta_tos")
            .describe("Meta Terms of Service acceptance screen")
            .required(&["text:Meta Terms and Privacy Policy"])
            .forbidden(&[":id/login_username", ":id/password", "text:Your story"])
            .unique(&["text:Meta Terms and Privacy Policy"])
            .optional(&["text:Continue", "text:Privacy Policy", "content-desc:Continue"])
            .priority(80)
            .recovery("click_continue")
            .build()?,
        ScreenSignature::builder(APP_ID, "login_page")
            .describe("Main login form with username/password fields")
            .required(&["content-desc:Username, email or mobile number", "content-desc:Password"])
            .forbidden(&[
                ":id/profile_header_container",
                "text:Your story",
                "text:Meta Terms and Privacy Policy",
            ])
            .unique(&["content-desc:Username, email or mobile number"])
            .optional(&["text:Log in", "text:Create new account", "text:Forgot password?"])
            .priority(80)
            .build()?,
        ScreenSignature::builder(APP_ID, "login_approval_required")
            .describe("Waiting for approval from another device")
            .required(&["text:Waiting for approval"])
            .forbidden(&[
                ":id/profile_header_container",
                "text:Your story",
                "content-desc:Username, email or mobile number",
            ])
            .unique(&["text:Waiting for approval"])
            .optional(&["text:Try another way", "text:Check your notifications on another device"])
            .priority(81)
            .recovery("click_try_another_way")
            .build()?,
        ScreenSignature::builder(APP_ID, "login_2fa_method_select")
            .describe("Choose 2FA verification method")
            .required(&["text:Choose a way to confirm it's you"])
            .forbidden(&[":id/profile_header_container", "text:Your story", "text:Waiting for approval"])
            .unique(&["text:Choose a way to confirm it's you"])
            .optional(&["text:Authentication app", "text:Backup code", "text:Continue"])
            .priority(81)
            .recovery("back")
            .build()?,
        ScreenSignature::builder(APP_ID, "login_2fa_code_entry")
            .describe("Enter 6-digit 2FA code from authenticator")
            .required(&["contains:6-digit code"])
            .forbidden(&[":id/profile_header_container", "text:Your story", "text:Choose a way to confirm"])
            .unique(&["contains:6-digit code"])
            .optional(&["text:Code", "text:Continue", "text:Go to your authentication app"])
            .priority(82)
            .recovery("back")
            .build()?,
        ScreenSignature::builder(APP_ID, "login_save_info")
            .describe("Save your login info prompt after login")
            .required(&["text:Save your login info?"])
            .forbidden(&[":id/profile_header_container", "text:Your story", "contains:6-digit code"])
            .unique(&["text:Save your login info?"])
            .optional(&["text:Save", "text:Not now"])
            .priority(82)
            .recovery("click_not_now")
            .build()?,
    ])
}

fn onboarding() -> Result<Vec<ScreenSignature>, SignatureError> {
    // (screen, description, required, unique, previous screen's marker, optional, priority, recovery)
    let steps: [(&str, &str, &str, &str, &str, &[&str], i32, &str); 6] = [
        (
            "onboarding_facebook_suggestions",
            "Connect to Facebook to find friends",
            "text:Get Facebook suggestions",
            ":id/find_friends_container",
            "text:Save your login info?",
            &["text:Skip", "text:Continue"],
            83,
            "click_skip",
        ),
        (
            "onboarding_contacts_sync",
            "Sync contacts to find friends",
            "contains:allow access to your contacts",
            ":id/connect_contacts_sync_button",
            "text:Get Facebook suggestions",
            &["text:Next"],
            83,
            "click_next",
        ),
        (
            "onboarding_profile_picture",
            "Add profile picture prompt",
            "contains:Add a profile picture",
            "text:Add a profile picture so your friends know it's you.",
            "text:Get Facebook suggestions",
            &["text:Add picture", "text:Skip"],
            84,
            "click_skip",
        ),
        (
            "onboarding_follow_people",
            "Try following 5+ people suggestion",
            "text:Try following 5+ people",
            "content-desc:Try following 5+ people",
            "text:Add a profile picture",
            &["text:Skip", "text:Follow"],
            84,
            "click_skip",
        ),
        (
            "onboarding_add_email",
            "Add email address for recovery",
            "text:Add an email address",
            ":id/add_email_form",
            "text:Try following 5+ people",
            &["text:Skip", "text:Next"],
            84,
            "click_skip",
        ),
        (
            "onboarding_preferences",
            "See more of what you love, content preferences",
            "text:See more of what you love",
            ":id/reels_tuning_container",
            "text:Add an email address",
            &["text:Skip", "text:Next"],
            84,
            "click_skip",
        ),
    ];

    steps
        .into_iter()
        .map(|(screen, desc, required, unique, previous, optional, priority, recovery)| {
            ScreenSignature::builder(APP_ID, screen)
                .describe(desc)
                .required(&[required])
                .forbidden(&[":id/profile_header_container", "text:Your story", previous])
                .unique(&[unique])
                .optional(optional)
                .priority(priority)
                .recovery(recovery)
                .safe()
                .build()
        })
        .collect()
}

fn navigation() -> Result<Vec<ScreenSignature>, SignatureError> {
    Ok(vec![
        ScreenSignature::builder(APP_ID, "explore_grid")
            .describe("Search/Explore landing page with grid content")
            .required(&[":id/action_bar_search_edit_text"])
            .forbidden(&[
                ":id/profile_header_container",
                ":id/layout_comment_thread_edittext",
                ":id/peek_container",
                "text:Your story",
                ":id/action_bar_button_back",
                ":id/scrollable_tab_layout",
            ])
            .unique(&[":id/explore_action_bar"])
            .optional(&[
                ":id/explore_action_bar_container",
                "content-desc:Search and explore",
                "contains:Reel by",
            ])
            .priority(40)
            .safe()
            .build()?,
        ScreenSignature::builder(APP_ID, "search_results_accounts")
            .describe("Search results showing Accounts tab")
            .required(&[":id/action_bar_button_back", ":id/scrollable_tab_layout"])
            .forbidden(&[
                ":id/explore_action_bar",
                ":id/profile_header_container",
                ":id/peek_container",
                "text:Your story",
                "contains:Reel by",
            ])
            .unique(&[":id/row_search_user_container"])
            .optional(&[":id/row_search_user_username", "text:Accounts", "text:Reels"])
            .priority(50)
            .recovery("click_explore")
            .build()?,
        ScreenSignature::builder(APP_ID, "search_results_reels")
            .describe("Search results showing Reels content")
            .required(&[":id/action_bar_button_back", ":id/scrollable_tab_layout", "contains:Reel by"])
            .forbidden(&[
                ":id/explore_action_bar",
                ":id/profile_header_container",
                ":id/peek_container",
                ":id/layout_comment_thread_edittext",
                "text:Your story",
            ])
            .optional(&[":id/action_bar_search_edit_text", ":id/play_count_container", "text:Reels"])
            .priority(55)
            .safe()
            .build()?,
        ScreenSignature::builder(APP_ID, "profile_page")
            .describe("User profile page (own or others)")
            .required(&[":id/profile_header_container"])
            .forbidden(&[
                ":id/action_bar_search_edit_text",
                ":id/clips_viewer_view_pager",
                ":id/layout_comment_thread_edittext",
                ":id/row_search_user_container",
                "text:Your story",
            ])
            .unique(&[":id/profile_header_container"])
            .optional(&[
                ":id/profile_tab_layout",
                ":id/profile_header_bio_text",
                "content-desc:Edit profile",
                "content-desc:Follow",
            ])
            .priority(35)
            .recovery("back")
            .build()?,
        ScreenSignature::builder(APP_ID, "home_feed")
            .describe("Main feed")
            .required(&[":id/row_feed_button_like"])
            .forbidden(&[
                ":id/action_bar_search_edit_text",
                ":id/profile_header_container",
                ":id/clips_viewer_view_pager",
                ":id/layout_comment_thread_edittext",
            ])
            .unique(&[":id/row_feed_button_like"])
            .optional(&[
                "text:Your story",
                ":id/main_feed_action_bar",
                ":id/title_logo",
                ":id/action_bar_inbox_button",
                "content-desc:reels tray container",
                ":id/feed_preview_keep_watching_button",
                ":id/row_feed_button_comment",
                ":id/row_feed_button_share",
                ":id/row_feed_button_save",
                ":id/media_group",
            ])
            .priority(25)
            .recovery("click_explore")
            .build()?,
        ScreenSignature::builder(APP_ID, "notifications")
            .describe("Activity/notifications screen")
            .required(&[":id/newsfeed_you"])
            .forbidden(&[
                ":id/action_bar_search_edit_text",
                ":id/profile_header_container",
                ":id/clips_viewer_view_pager",
                "text:Your story",
            ])
            .unique(&[":id/newsfeed_you"])
            .optional(&["text:Notifications", "text:Today", "text:Yesterday"])
            .priority(30)
            .recovery("back")
            .build()?,
        ScreenSignature::builder(APP_ID, "dm_inbox")
            .describe("Direct messages inbox")
            .required(&[":id/inbox_refreshable_thread_list_recyclerview"])
            .forbidden(&[
                ":id/action_bar_search_edit_text",
                ":id/profile_header_container",
                ":id/clips_viewer_view_pager",
                ":id/newsfeed_you",
                "text:Your story",
            ])
            .unique(&[":id/inbox_refreshable_thread_list_recyclerview"])
            .optional(&[":id/row_inbox_container", "text:Primary", "content-desc:New Message"])
            .priority(30)
            .recovery("back")
            .build()?,
        ScreenSignature::builder(APP_ID, "dm_thread")
            .describe("Individual DM conversation")
            .required(&[":id/message_list"])
            .forbidden(&[
                ":id/inbox_refreshable_thread_list_recyclerview",
                ":id/action_bar_search_edit_text",
                ":id/profile_header_container",
                ":id/clips_viewer_view_pager",
            ])
            .unique(&[":id/message_list", ":id/thread_fragment_container"])
            .optional(&[
                ":id/row_thread_composer_container",
                ":id/row_thread_composer_edittext",
                "content-desc:Back",
            ])
            .priority(32)
            .recovery("back")
            .build()?,
    ])
}

fn content() -> Result<Vec<ScreenSignature>, SignatureError> {
    Ok(vec![
        ScreenSignature::builder(APP_ID, "reel_viewing")
            .describe("Full-screen reel player")
            .required(&[":id/clips_viewer_view_pager"])
            .forbidden(&[
                ":id/action_bar_search_edit_text",
                ":id/scrollable_tab_layout",
                ":id/layout_comment_thread_edittext",
                ":id/peek_container",
                "text:Views & likes",
                "text:Your story",
            ])
            .unique(&[":id/clips_viewer_view_pager"])
            .optional(&[
                ":id/like_button",
                ":id/comment_button",
                ":id/clips_author_username",
                ":id/clips_caption_component",
                "content-desc:Like OR content-desc:Unlike",
                "contains:Reel by",
            ])
            .priority(30)
            .safe()
            .build()?,
        ScreenSignature::builder(APP_ID, "story_viewing")
            .describe("Full-screen story viewer")
            .required(&[":id/reel_viewer_root"])
            .forbidden(&[
                ":id/clips_viewer_view_pager",
                ":id/action_bar_search_edit_text",
                ":id/layout_comment_thread_edittext",
                ":id/profile_header_container",
                "text:Your story",
            ])
            .unique(&[":id/reel_viewer_root"])
            .optional(&[
                ":id/reel_viewer_progress_bar",
                ":id/reel_viewer_header",
                ":id/story_comment_preview_container",
                "content-desc:Share",
            ])
            .priority(32)
            .recovery("back")
            .build()?,
    ])
}
