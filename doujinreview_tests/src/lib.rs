//! End-to-end checks against a running service.
//! The service is expected at http://127.0.0.1:80 with
//! `ADMIN_EMAILS=admin@doujinreview.test` in its environment.
