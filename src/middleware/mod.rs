//! Middleware chain: ordered request/response interceptors run before routing.
//!
//! Every entry sees the parsed [`Request`] and the in-progress [`Response`]
//! and answers with a [`Flow`]. The first [`Flow::Halt`] stops the chain and
//! skips routing; the response as mutated so far is finalized and sent.
//!
//! Two registration forms exist and both land in the same ordered sequence:
//!
//! - [`MiddlewareChain::push`]: always-continue decorators
//!   (`Fn(&mut Request, &mut Response)`), adapted to return [`Flow::Continue`].
//! - [`MiddlewareChain::push_guard`]: short-circuiting entries that decide
//!   whether processing goes on.

use crate::http::{Request, Response};

/// Whether the exchange should proceed past a middleware entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Flow {
    Continue,
    Halt,
}

impl From<bool> for Flow {
    fn from(proceed: bool) -> Self {
        if proceed { Flow::Continue } else { Flow::Halt }
    }
}

/// A type-erased middleware entry in its uniform short-circuiting shape.
pub type Middleware = Box<dyn Fn(&mut Request, &mut Response) -> Flow>;

/// The ordered middleware sequence.
///
/// # Examples
///
/// ```
/// use hubhttp::http::{Request, Response, StatusCode};
/// use hubhttp::middleware::{Flow, MiddlewareChain};
///
/// let mut chain = MiddlewareChain::new();
/// chain.push(|_req, res| {
///     res.set_header("X-Device", "hub");
/// });
/// chain.push_guard(|req, res| {
///     if req.has_header("authorization") {
///         Flow::Continue
///     } else {
///         res.set_status(StatusCode::UNAUTHORIZED);
///         Flow::Halt
///     }
/// });
///
/// let (mut req, _) = Request::parse(b"GET / HTTP/1.1\r\n\r\n").unwrap();
/// let mut res = Response::default();
/// assert_eq!(chain.run(&mut req, &mut res), Flow::Halt);
/// assert_eq!(res.status(), StatusCode::UNAUTHORIZED);
/// ```
#[derive(Default)]
pub struct MiddlewareChain {
    entries: Vec<Middleware>,
}

impl MiddlewareChain {
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends an always-continue middleware.
    pub fn push<F>(&mut self, middleware: F)
    where
        F: Fn(&mut Request, &mut Response) + 'static,
    {
        self.entries.push(Box::new(move |req: &mut Request, res: &mut Response| {
            middleware(req, res);
            Flow::Continue
        }));
    }

    /// Appends a middleware that may halt the exchange.
    ///
    /// The callable may return a [`Flow`] or a `bool` (`true` = continue).
    pub fn push_guard<F, R>(&mut self, middleware: F)
    where
        F: Fn(&mut Request, &mut Response) -> R + 'static,
        R: Into<Flow>,
    {
        self.entries
            .push(Box::new(move |req: &mut Request, res: &mut Response| {
                middleware(req, res).into()
            }));
    }

    /// Runs the entries in registration order until one halts.
    pub fn run(&self, req: &mut Request, res: &mut Response) -> Flow {
        for entry in &self.entries {
            if entry(req, res) == Flow::Halt {
                return Flow::Halt;
            }
        }
        Flow::Continue
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use std::cell::RefCell;
    use std::rc::Rc;

    use super::*;
    use crate::http::StatusCode;

    fn request() -> Request {
        Request::parse(b"GET /x HTTP/1.1\r\n\r\n").unwrap().0
    }

    #[test]
    fn empty_chain_continues() {
        let chain = MiddlewareChain::new();
        assert!(chain.is_empty());
        let mut res = Response::default();
        assert_eq!(chain.run(&mut request(), &mut res), Flow::Continue);
    }

    #[test]
    fn runs_in_registration_order() {
        let seen = Rc::new(RefCell::new(Vec::new()));
        let mut chain = MiddlewareChain::new();
        for tag in ["a", "b", "c"] {
            let seen = Rc::clone(&seen);
            chain.push(move |_, _| seen.borrow_mut().push(tag));
        }
        let mut res = Response::default();
        chain.run(&mut request(), &mut res);
        assert_eq!(*seen.borrow(), vec!["a", "b", "c"]);
    }

    #[test]
    fn halt_skips_later_entries() {
        let later_ran = Rc::new(RefCell::new(false));
        let mut chain = MiddlewareChain::new();
        chain.push(|_, res| {
            res.set_header("X-First", "1");
        });
        chain.push_guard(|_, res| {
            res.set_status(StatusCode::FORBIDDEN);
            false
        });
        let flag = Rc::clone(&later_ran);
        chain.push(move |_, _| *flag.borrow_mut() = true);
        assert_eq!(chain.len(), 3);

        let mut res = Response::default();
        assert_eq!(chain.run(&mut request(), &mut res), Flow::Halt);
        assert_eq!(res.status(), StatusCode::FORBIDDEN);
        assert_eq!(res.headers().get("x-first"), Some("1"));
        assert!(!*later_ran.borrow());
    }
}
