//! Pages the site renders itself, outside any workflow step.

use crate::config::SiteConfig;
use stepform_core::markup::{self, Node};
use stepform_core::{CoreError, FieldSet, FieldSpec, Page, Request, Token, Values, make_page};

/// Form path the login page posts to.
pub const LOGIN_PATH: &str = "/login";
/// Hidden parameter naming the step to resume after login.
pub const RESUME_PARAM: &str = "resume";

const USER_ROLE: &str = "user";

fn login_fields() -> Result<FieldSet, CoreError> {
    FieldSet::initial(vec![FieldSpec::text(USER_ROLE, 20)], &Values::new())
}

pub fn login_page(config: &SiteConfig, resume: &Token) -> Result<Page, CoreError> {
    let fields = login_fields()?;
    let body = Node::list([
        markup::banner("Log in"),
        markup::paragraph("Please identify yourself to continue."),
        markup::form(
            LOGIN_PATH,
            false,
            Node::list([
                markup::hidden(RESUME_PARAM, resume.as_str()),
                markup::table(
                    None,
                    markup::row(Node::list([
                        markup::desc("User id:"),
                        markup::cell(fields.input(USER_ROLE)?),
                    ])),
                ),
                markup::submit_button("Log in"),
            ]),
        ),
    ]);
    Ok(styled(config, make_page(format!("{}: Log in", config.site_title), body)))
}

/// The user id submitted through [`login_page`].
pub fn read_login(req: &Request) -> Option<String> {
    let fields = login_fields().ok()?;
    let submission = fields.read(req);
    let user = submission.text(USER_ROLE).trim();
    let valid = !user.is_empty()
        && user
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '.' | '_' | '-' | '@'));
    valid.then(|| user.to_string())
}

pub fn expired_page(config: &SiteConfig) -> Page {
    let body = Node::list([
        markup::banner("Page expired"),
        markup::paragraph(
            "This page is no longer active. It may have been completed already, \
             or it was left idle for too long.",
        ),
        markup::paragraph(markup::hyperlink("/", "Start over")),
    ]);
    styled(config, make_page(format!("{}: Page expired", config.site_title), body))
}

pub fn failure_page(config: &SiteConfig, reason: &str) -> Page {
    let body = Node::list([
        markup::banner("Request failed"),
        markup::paragraph(Node::list([
            markup::text("The request could not be completed: "),
            markup::span("error", reason),
        ])),
    ]);
    styled(config, make_page(format!("{}: Request failed", config.site_title), body))
}

pub fn index_page(config: &SiteConfig) -> Page {
    let body = Node::list([
        markup::banner(config.site_title.clone()),
        markup::paragraph(markup::hyperlink("/calendar", "Calendar")),
        markup::paragraph(markup::hyperlink("/elections/new", "Create a new election")),
    ]);
    styled(config, make_page(config.site_title.clone(), body))
}

/// Applies the configured stylesheet.
pub fn styled(config: &SiteConfig, page: Page) -> Page {
    match &config.stylesheet {
        Some(href) => page.with_stylesheet(href.clone()),
        None => page,
    }
}
