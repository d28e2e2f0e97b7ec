//! In-memory backend doubles with failure injection.

use std::collections::{HashMap, HashSet};
use std::sync::Mutex;

use async_trait::async_trait;
use chrono::{Duration, Utc};

use super::{AuthProvider, AuthSession, AuthUser, BlobStore, Credentials, DocumentStore, Fields};
use crate::error::{AuthErrorCode, Result, VoiceError};

/// Backend operations a test can make fail or hang.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Op {
    Get,
    Set,
    Put,
    Url,
    Delete,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Event {
    Get(String),
    Set { key: String, fields: Fields, merge: bool },
    Put(String, usize),
    Url(String),
    Delete(String),
}

#[derive(Default)]
struct Faults {
    failing: HashSet<Op>,
    stalled: HashSet<Op>,
}

impl Faults {
    async fn check(faults: &Mutex<Faults>, op: Op) -> Result<()> {
        let (fail, stall) = {
            let faults = faults.lock().unwrap();
            (faults.failing.contains(&op), faults.stalled.contains(&op))
        };
        if stall {
            std::future::pending::<()>().await;
        }
        if fail {
            return Err(VoiceError::Backend(format!("injected {op:?} failure")));
        }
        Ok(())
    }
}

/// Documents and blobs in one place so tests can inspect both sides.
#[derive(Default)]
pub struct MemoryBackend {
    docs: Mutex<HashMap<String, Fields>>,
    blobs: Mutex<HashMap<String, Vec<u8>>>,
    faults: Mutex<Faults>,
    journal: Mutex<Vec<Event>>,
}

impl MemoryBackend {
    pub fn fail(&self, op: Op) {
        self.faults.lock().unwrap().failing.insert(op);
    }

    pub fn stall(&self, op: Op) {
        self.faults.lock().unwrap().stalled.insert(op);
    }

    pub fn heal(&self) {
        let mut faults = self.faults.lock().unwrap();
        faults.failing.clear();
        faults.stalled.clear();
    }

    pub fn journal(&self) -> Vec<Event> {
        self.journal.lock().unwrap().clone()
    }

    pub fn doc(&self, collection: &str, id: &str) -> Option<Fields> {
        self.docs
            .lock()
            .unwrap()
            .get(&format!("{collection}/{id}"))
            .cloned()
    }

    pub fn insert_doc(&self, collection: &str, id: &str, fields: Fields) {
        self.docs
            .lock()
            .unwrap()
            .insert(format!("{collection}/{id}"), fields);
    }

    pub fn blob(&self, path: &str) -> Option<Vec<u8>> {
        self.blobs.lock().unwrap().get(path).cloned()
    }

    pub fn insert_blob(&self, path: &str, bytes: &[u8]) {
        self.blobs
            .lock()
            .unwrap()
            .insert(path.to_string(), bytes.to_vec());
    }

    fn log(&self, event: Event) {
        self.journal.lock().unwrap().push(event);
    }
}

#[async_trait]
impl DocumentStore for MemoryBackend {
    async fn get(&self, collection: &str, id: &str) -> Result<Option<Fields>> {
        let key = format!("{collection}/{id}");
        self.log(Event::Get(key.clone()));
        Faults::check(&self.faults, Op::Get).await?;
        Ok(self.docs.lock().unwrap().get(&key).cloned())
    }

    async fn set(&self, collection: &str, id: &str, fields: Fields, merge: bool) -> Result<()> {
        let key = format!("{collection}/{id}");
        self.log(Event::Set {
            key: key.clone(),
            fields: fields.clone(),
            merge,
        });
        Faults::check(&self.faults, Op::Set).await?;
        let mut docs = self.docs.lock().unwrap();
        if merge {
            docs.entry(key).or_default().extend(fields);
        } else {
            docs.insert(key, fields);
        }
        Ok(())
    }
}

#[async_trait]
impl BlobStore for MemoryBackend {
    async fn put(&self, path: &str, bytes: Vec<u8>, _content_type: &str) -> Result<()> {
        self.log(Event::Put(path.to_string(), bytes.len()));
        Faults::check(&self.faults, Op::Put).await?;
        self.blobs.lock().unwrap().insert(path.to_string(), bytes);
        Ok(())
    }

    async fn url(&self, path: &str) -> Result<String> {
        self.log(Event::Url(path.to_string()));
        Faults::check(&self.faults, Op::Url).await?;
        if !self.blobs.lock().unwrap().contains_key(path) {
            return Err(VoiceError::Backend(format!("no blob at {path}")));
        }
        Ok(format!("https://blobs.test/{path}?token=t"))
    }

    async fn delete(&self, path: &str) -> Result<()> {
        self.log(Event::Delete(path.to_string()));
        Faults::check(&self.faults, Op::Delete).await?;
        self.blobs.lock().unwrap().remove(path);
        Ok(())
    }
}

struct Account {
    uid: String,
    password: String,
}

/// Email/password accounts plus federated sign-in, tokens minted per call.
#[derive(Default)]
pub struct MemoryAuth {
    accounts: Mutex<HashMap<String, Account>>,
    pub active: Mutex<Option<AuthSession>>,
    pub refreshes: Mutex<u32>,
    /// Lifetime of tokens minted by sign-in. One hour when unset.
    pub token_lifetime: Mutex<Option<Duration>>,
}

impl MemoryAuth {
    pub fn with_account(email: &str, password: &str, uid: &str) -> Self {
        let auth = Self::default();
        auth.accounts.lock().unwrap().insert(
            email.to_string(),
            Account {
                uid: uid.to_string(),
                password: password.to_string(),
            },
        );
        auth
    }

    fn lifetime(&self) -> Duration {
        self.token_lifetime
            .lock()
            .unwrap()
            .unwrap_or_else(|| Duration::hours(1))
    }

    pub fn session(uid: &str, email: &str, expires_in: Duration) -> AuthSession {
        AuthSession {
            user: AuthUser {
                uid: uid.to_string(),
                email: email.to_string(),
                display_name: None,
                photo_url: None,
            },
            credentials: Credentials {
                id_token: format!("id-{uid}"),
                refresh_token: format!("refresh-{uid}"),
                expires_at: Utc::now() + expires_in,
            },
        }
    }
}

#[async_trait]
impl AuthProvider for MemoryAuth {
    async fn sign_in(&self, email: &str, password: &str) -> Result<AuthSession> {
        let accounts = self.accounts.lock().unwrap();
        let account = accounts
            .get(email)
            .ok_or(VoiceError::Auth(AuthErrorCode::UserNotFound))?;
        if account.password != password {
            return Err(VoiceError::Auth(AuthErrorCode::WrongPassword));
        }
        Ok(Self::session(&account.uid, email, self.lifetime()))
    }

    async fn sign_up(&self, email: &str, password: &str) -> Result<AuthSession> {
        if !email.contains('@') {
            return Err(VoiceError::Auth(AuthErrorCode::InvalidEmail));
        }
        if password.len() < 6 {
            return Err(VoiceError::Auth(AuthErrorCode::WeakPassword));
        }
        let mut accounts = self.accounts.lock().unwrap();
        if accounts.contains_key(email) {
            return Err(VoiceError::Auth(AuthErrorCode::EmailAlreadyInUse));
        }
        let uid = format!("uid-{}", accounts.len() + 1);
        accounts.insert(
            email.to_string(),
            Account {
                uid: uid.clone(),
                password: password.to_string(),
            },
        );
        Ok(Self::session(&uid, email, Duration::hours(1)))
    }

    async fn sign_in_with_federated_credential(&self, id_token: &str) -> Result<AuthSession> {
        let mut session = Self::session("google-uid", "g@example.com", Duration::hours(1));
        session.user.display_name = Some(format!("Google {id_token}"));
        session.user.photo_url = Some("https://photos.test/g.jpg".to_string());
        Ok(session)
    }

    async fn refresh(&self, session: &AuthSession) -> Result<AuthSession> {
        *self.refreshes.lock().unwrap() += 1;
        let mut refreshed = session.clone();
        refreshed.credentials.id_token = format!("{}-r", session.credentials.id_token);
        refreshed.credentials.expires_at = Utc::now() + Duration::hours(1);
        Ok(refreshed)
    }

    fn activate(&self, session: Option<&AuthSession>) {
        *self.active.lock().unwrap() = session.cloned();
    }
}
