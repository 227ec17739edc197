//! Shell integration scripts.
//!
//! ```bash
//! # ~/.zshrc
//! eval "$(shellmind init zsh)"
//! ```

use clap::ValueEnum;

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum Shell {
    Zsh,
}

pub fn script(shell: Shell) -> &'static str {
    match shell {
        Shell::Zsh => ZSH_SCRIPT,
    }
}

// Ctrl-Space asks for a completion and falls back to native completion when
// shellmind prints nothing. The last few commands from `fc` go along as
// `--recent` for the context fingerprint. The session id is made up in the shell so that
// session-start can run in the background. The announcement check is a file
// test so most prompts spawn no process.
const ZSH_SCRIPT: &str = r#"# shellmind zsh integration
if [[ -o interactive && -z "$_SHELLMIND_LOADED" ]]; then
  typeset -g _SHELLMIND_LOADED=1
  typeset -g _SHELLMIND_ANNOUNCED=0
  typeset -g _SHELLMIND_SESSION="zsh-$$-${RANDOM}${RANDOM}"
  command shellmind session-start --session "$_SHELLMIND_SESSION" >/dev/null 2>&1 &!

  _shellmind_complete() {
    local suggestion cmd
    local -a recent_args
    for cmd in "${(@f)$(fc -ln -3 2>/dev/null)}"; do
      [[ -n "$cmd" ]] && recent_args+=("--recent=$cmd")
    done
    suggestion="$(command shellmind complete --session "$_SHELLMIND_SESSION" "${recent_args[@]}" -- "$BUFFER" 2>/dev/null)"
    if [[ -n "$suggestion" ]]; then
      BUFFER="$suggestion"
      CURSOR=${#BUFFER}
      zle redisplay
    else
      zle expand-or-complete
    fi
  }
  zle -N _shellmind_complete
  bindkey '^@' _shellmind_complete

  _shellmind_precmd() {
    (( _SHELLMIND_ANNOUNCED )) && return
    [[ -n "$_SHELLMIND_SESSION" ]] || return
    [[ -e "${SHELLMIND_HOME:-$HOME/.shellmind}/sessions/$_SHELLMIND_SESSION/announcement" ]] || return
    local message
    message="$(command shellmind precmd --session "$_SHELLMIND_SESSION" 2>/dev/null)"
    if [[ -n "$message" ]]; then
      _SHELLMIND_ANNOUNCED=1
      print -r -- "$message"
    fi
  }
  autoload -Uz add-zsh-hook
  add-zsh-hook precmd _shellmind_precmd
fi
"#;
