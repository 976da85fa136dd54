//! Interception Chain
//!
//! Every overridable core operation is a `Hook`: the core function at the
//! bottom plus a stack of wrappers installed by plugins. A wrapper gets a
//! single-use `Next` continuation that runs the rest of the chain. The
//! most recently installed wrapper runs first.
//!
//! Wrappers can be removed in any order; each one is identified by the
//! token `wrap` returned. Calls run against a snapshot of the chain, so a
//! wrapper that wraps or unwraps while the hook is running only affects
//! later calls.
//!
//! A wrapper that returns without calling through breaks the chain. This
//! is counted per hook and logged.

use std::cell::Cell;
use std::fmt;
use std::rc::Rc;

use tracing::warn;

/// Wrapper function: context, arguments, rest of the chain
pub type Handler<C, A, R> = Rc<dyn Fn(&mut C, A, Next<'_, C, A, R>) -> R>;

/// Identifies one installed wrapper
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct WrapToken(u64);

struct Link<C, A, R> {
    token: WrapToken,
    owner: String,
    handler: Handler<C, A, R>,
}

impl<C, A, R> Clone for Link<C, A, R> {
    fn clone(&self) -> Self {
        Self {
            token: self.token,
            owner: self.owner.clone(),
            handler: self.handler.clone(),
        }
    }
}

/// One overridable operation
pub struct Hook<C, A, R> {
    name: &'static str,
    base: fn(&mut C, A) -> R,
    /// Installation order; the last link runs first
    links: Rc<Vec<Link<C, A, R>>>,
    next_token: u64,
    breaks: Rc<Cell<u64>>,
}

impl<C, A, R> fmt::Debug for Hook<C, A, R> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Hook")
            .field("name", &self.name)
            .field("wrappers", &self.owners())
            .field("breaks", &self.breaks.get())
            .finish()
    }
}

impl<C, A, R> Hook<C, A, R> {
    pub fn new(name: &'static str, base: fn(&mut C, A) -> R) -> Self {
        Self {
            name,
            base,
            links: Rc::new(Vec::new()),
            next_token: 0,
            breaks: Rc::new(Cell::new(0)),
        }
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    /// Install `handler` on top of the chain
    pub fn wrap<F>(&mut self, owner: &str, handler: F) -> WrapToken
    where
        F: Fn(&mut C, A, Next<'_, C, A, R>) -> R + 'static,
    {
        let token = WrapToken(self.next_token);
        self.next_token += 1;

        let mut links: Vec<Link<C, A, R>> = self.links.as_ref().clone();
        links.push(Link {
            token,
            owner: owner.to_string(),
            handler: Rc::new(handler),
        });
        self.links = Rc::new(links);
        token
    }

    /// Remove the wrapper installed under `token`
    ///
    /// Returns false if the token is not (or no longer) installed.
    pub fn unwrap(&mut self, token: WrapToken) -> bool {
        if !self.links.iter().any(|l| l.token == token) {
            return false;
        }
        let links: Vec<Link<C, A, R>> = self
            .links
            .iter()
            .filter(|l| l.token != token)
            .cloned()
            .collect();
        self.links = Rc::new(links);
        true
    }

    pub fn is_wrapped(&self) -> bool {
        !self.links.is_empty()
    }

    /// Owners of installed wrappers, outermost first
    pub fn owners(&self) -> Vec<&str> {
        self.links.iter().rev().map(|l| l.owner.as_str()).collect()
    }

    /// Number of calls in which some wrapper did not call through
    pub fn chain_breaks(&self) -> u64 {
        self.breaks.get()
    }

    /// Freeze the current chain so it can run while the hook's owner is borrowed
    pub fn snapshot(&self) -> Chain<C, A, R> {
        Chain {
            name: self.name,
            base: self.base,
            links: self.links.clone(),
            breaks: self.breaks.clone(),
        }
    }

    pub fn call(&self, ctx: &mut C, args: A) -> R {
        self.snapshot().call(ctx, args)
    }
}

/// A frozen chain ready to run
pub struct Chain<C, A, R> {
    name: &'static str,
    base: fn(&mut C, A) -> R,
    links: Rc<Vec<Link<C, A, R>>>,
    breaks: Rc<Cell<u64>>,
}

impl<C, A, R> Chain<C, A, R> {
    pub fn call(&self, ctx: &mut C, args: A) -> R {
        self.call_at(self.links.len(), ctx, args)
    }

    fn call_at(&self, depth: usize, ctx: &mut C, args: A) -> R {
        if depth == 0 {
            return (self.base)(ctx, args);
        }

        let link = &self.links[depth - 1];
        let called = Cell::new(false);
        let next = Next {
            chain: self,
            depth: depth - 1,
            called: &called,
        };
        let result = (link.handler)(ctx, args, next);

        if !called.get() {
            self.breaks.set(self.breaks.get() + 1);
            warn!(
                "Wrapper from {} on {} returned without calling through",
                link.owner, self.name
            );
        }
        result
    }
}

/// The remainder of a chain, callable once
pub struct Next<'a, C, A, R> {
    chain: &'a Chain<C, A, R>,
    depth: usize,
    called: &'a Cell<bool>,
}

impl<C, A, R> Next<'_, C, A, R> {
    pub fn call(self, ctx: &mut C, args: A) -> R {
        self.called.set(true);
        self.chain.call_at(self.depth, ctx, args)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[derive(Default)]
    struct Ctx {
        base_calls: u32,
        trace: Vec<String>,
    }

    fn base(ctx: &mut Ctx, x: i32) -> i32 {
        ctx.base_calls += 1;
        ctx.trace.push("base".into());
        x
    }

    fn wrap_tracing(hook: &mut Hook<Ctx, i32, i32>, name: &'static str) -> WrapToken {
        hook.wrap(name, move |ctx, x, next| {
            ctx.trace.push(name.to_string());
            next.call(ctx, x + 1)
        })
    }

    #[test]
    fn test_last_wrapper_runs_first() {
        let mut hook = Hook::new("test", base);
        wrap_tracing(&mut hook, "a");
        wrap_tracing(&mut hook, "b");

        let mut ctx = Ctx::default();
        assert_eq!(hook.call(&mut ctx, 0), 2);
        assert_eq!(ctx.trace, vec!["b", "a", "base"]);
        assert_eq!(hook.owners(), vec!["b", "a"]);
        assert_eq!(hook.chain_breaks(), 0);
    }

    #[test]
    fn test_unwrap_out_of_order() {
        let mut hook = Hook::new("test", base);
        let a = wrap_tracing(&mut hook, "a");
        let b = wrap_tracing(&mut hook, "b");
        let c = wrap_tracing(&mut hook, "c");

        assert!(hook.unwrap(b));
        assert!(!hook.unwrap(b));

        let mut ctx = Ctx::default();
        hook.call(&mut ctx, 0);
        assert_eq!(ctx.trace, vec!["c", "a", "base"]);

        assert!(hook.unwrap(a));
        assert!(hook.unwrap(c));
        assert!(!hook.is_wrapped());
    }

    #[test]
    fn test_broken_chain_is_counted() {
        let mut hook = Hook::new("test", base);
        hook.wrap("lazy", |_ctx: &mut Ctx, x, _next| x * 10);
        let mut ctx = Ctx::default();

        assert_eq!(hook.call(&mut ctx, 3), 30);
        assert_eq!(ctx.base_calls, 0);
        assert_eq!(hook.chain_breaks(), 1);
    }

    #[test]
    fn test_wrap_during_call_affects_later_calls_only() {
        struct Owner {
            hook: Hook<Owner, (), u32>,
            calls: u32,
        }

        fn count(owner: &mut Owner, _: ()) -> u32 {
            owner.calls += 1;
            owner.calls
        }

        let mut owner = Owner {
            hook: Hook::new("count", count),
            calls: 0,
        };
        owner.hook.wrap("installer", |o: &mut Owner, _, next| {
            o.hook.wrap("late", |o: &mut Owner, _, next| {
                o.calls += 100;
                next.call(o, ())
            });
            next.call(o, ())
        });

        let chain = owner.hook.snapshot();
        assert_eq!(chain.call(&mut owner, ()), 1);
        let chain = owner.hook.snapshot();
        assert_eq!(owner.hook.owners(), vec!["late", "installer"]);
        assert_eq!(chain.call(&mut owner, ()), 102);
    }

    #[derive(Debug, Clone)]
    enum Op {
        Wrap,
        Unwrap(usize),
        Call,
    }

    fn op_strategy() -> impl Strategy<Value = Op> {
        prop_oneof![
            2 => Just(Op::Wrap),
            2 => (0usize..16).prop_map(Op::Unwrap),
            3 => Just(Op::Call),
        ]
    }

    #[derive(Default)]
    struct Counts {
        base: u32,
        per_wrapper: std::collections::HashMap<u64, u32>,
    }

    fn count_base(ctx: &mut Counts, _: ()) {
        ctx.base += 1;
    }

    proptest! {
        #[test]
        fn prop_chain_integrity(ops in prop::collection::vec(op_strategy(), 1..64)) {
            let mut hook: Hook<Counts, (), ()> = Hook::new("prop", count_base);
            let mut installed: Vec<(u64, WrapToken)> = Vec::new();
            let mut next_id = 0u64;

            for op in ops {
                match op {
                    Op::Wrap => {
                        let id = next_id;
                        next_id += 1;
                        let token = hook.wrap("prop", move |ctx: &mut Counts, args, next| {
                            *ctx.per_wrapper.entry(id).or_default() += 1;
                            next.call(ctx, args)
                        });
                        installed.push((id, token));
                    }
                    Op::Unwrap(i) => {
                        if !installed.is_empty() {
                            let (_, token) = installed.remove(i % installed.len());
                            prop_assert!(hook.unwrap(token));
                        }
                    }
                    Op::Call => {
                        let mut ctx = Counts::default();
                        hook.call(&mut ctx, ());
                        prop_assert_eq!(ctx.base, 1);
                        prop_assert_eq!(ctx.per_wrapper.len(), installed.len());
                        for (id, _) in &installed {
                            prop_assert_eq!(ctx.per_wrapper.get(id), Some(&1));
                        }
                    }
                }
            }
            prop_assert_eq!(hook.chain_breaks(), 0);
        }
    }
}
