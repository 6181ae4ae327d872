//! Typed context accumulation.
//!
//! Each middleware returns a fragment; the pipeline folds it onto the
//! context built so far. The context is a type-level list, newest fragment
//! first:
//!
//! ```text
//! Nil                                   ← before any middleware
//! Cons<Session, Nil>                    ← .with(load_session)
//! Cons<Owner, Cons<Session, Nil>>       ← .with(check_owner)
//! ```
//!
//! Fields are read by type through [`Has`]; the index parameter `I` is
//! inferred, so callers write `let session: &Session = ctx.get();`. Reading a
//! type that no earlier step produced does not compile. Neither does reading
//! a type that two steps produced: the index becomes ambiguous.

use std::marker::PhantomData;

/// The empty context.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct Nil;

/// A context with `head` merged on top of `tail`.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Cons<H, T> {
    head: H,
    tail: T,
}

impl<H, T> Cons<H, T> {
    /// The most recently merged fragment.
    pub fn head(&self) -> &H { &self.head }

    /// Everything merged before [`head`](Cons::head).
    pub fn tail(&self) -> &T { &self.tail }
}

/// Anything that can sit in the pipeline as accumulated context.
pub trait Context: Clone + Send + Sync + 'static {
    /// Number of fragments merged so far.
    const LEN: usize;

    /// Folds `fragment` on top of `self`. Nothing is removed or overwritten;
    /// `self` is consumed, not mutated, so any clone held by an earlier step
    /// still sees the old shape.
    fn merge<F>(self, fragment: F) -> Cons<F, Self>
    where
        F: Clone + Send + Sync + 'static,
    {
        Cons { head: fragment, tail: self }
    }
}

impl Context for Nil {
    const LEN: usize = 0;
}

impl<H, T> Context for Cons<H, T>
where
    H: Clone + Send + Sync + 'static,
    T: Context,
{
    const LEN: usize = T::LEN + 1;
}

// ── Lookup ────────────────────────────────────────────────────────────────────

/// Index marker: the wanted type is the head.
pub struct Here;

/// Index marker: the wanted type is somewhere in the tail, at `I`.
pub struct There<I>(PhantomData<I>);

/// Field access by type.
pub trait Has<T, I> {
    fn get(&self) -> &T;
}

impl<T, Tail> Has<T, Here> for Cons<T, Tail> {
    fn get(&self) -> &T {
        &self.head
    }
}

impl<T, H, Tail, I> Has<T, There<I>> for Cons<H, Tail>
where
    Tail: Has<T, I>,
{
    fn get(&self) -> &T {
        self.tail.get()
    }
}
