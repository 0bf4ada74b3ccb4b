// ── Authentication seam ──
//
// The controller only needs sign-in, sign-out, and a stream of the
// current user. The hosted identity client implements it; tests supply
// their own.

use futures_util::FutureExt;
use futures_util::future::BoxFuture;
use secrecy::SecretString;
use tokio::sync::watch;

use crate::error::CoreError;

pub use domus_api::AuthUser as User;

/// Email/password identity provider.
pub trait Authenticator: Send + Sync + 'static {
    fn sign_in<'a>(
        &'a self,
        email: &'a str,
        password: &'a SecretString,
    ) -> BoxFuture<'a, Result<User, CoreError>>;

    fn sign_out(&self) -> BoxFuture<'_, ()>;

    /// `Some` while a user is signed in.
    fn state(&self) -> watch::Receiver<Option<User>>;
}

impl Authenticator for domus_api::AuthClient {
    fn sign_in<'a>(
        &'a self,
        email: &'a str,
        password: &'a SecretString,
    ) -> BoxFuture<'a, Result<User, CoreError>> {
        async move { Ok(domus_api::AuthClient::sign_in(self, email, password).await?) }.boxed()
    }

    fn sign_out(&self) -> BoxFuture<'_, ()> {
        domus_api::AuthClient::sign_out(self).boxed()
    }

    fn state(&self) -> watch::Receiver<Option<User>> {
        domus_api::AuthClient::state(self)
    }
}
